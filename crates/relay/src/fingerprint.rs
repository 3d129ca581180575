//! Stable, order-independent digests over alert identity fields.
//!
//! Every field is streamed into a 64-bit FNV-1a sum followed by a `0xff`
//! separator byte, which cannot occur inside UTF-8 text, so adjacent fields
//! never run together. Map entries are always visited in sorted key order.

use std::collections::HashMap;
use std::hash::Hasher;

use fnv::FnvHasher;

use crate::alert::Alert;

const SEPARATOR: [u8; 1] = [0xff];

#[derive(Default)]
struct Digest(FnvHasher);

impl Digest {
    fn field(&mut self, value: &str) -> &mut Self {
        self.0.write(value.as_bytes());
        self.0.write(&SEPARATOR);
        self
    }

    fn map(&mut self, entries: &HashMap<String, String>) -> &mut Self {
        let mut keys: Vec<&String> = entries.keys().collect();
        keys.sort();
        for key in keys {
            self.field(key).field(&entries[key]);
        }
        self
    }

    fn hex(&self) -> String {
        format!("{:016x}", self.0.finish())
    }
}

/// Identifies the alert occurrence across status changes: labels and start
/// time only.
pub fn labels_fingerprint(alert: &Alert) -> String {
    Digest::default()
        .map(&alert.labels)
        .field(&alert.starts_at)
        .hex()
}

/// Identifies the exact message content: annotations, labels, start time
/// and status.
///
/// Annotations are keyed by their own keys. Earlier deployments enumerated
/// label keys while reading annotation values, so only annotations sharing
/// a name with a label took part; digests from those deployments do not
/// match these.
pub fn content_fingerprint(alert: &Alert) -> String {
    Digest::default()
        .map(&alert.annotations)
        .map(&alert.labels)
        .field(&alert.starts_at)
        .field(&alert.status)
        .hex()
}

/// Key of the thread record grouping every status of one occurrence.
pub fn thread_id(channel: &str, alert: &Alert) -> String {
    format!("alert/{}/{}", channel, labels_fingerprint(alert))
}

/// Key of the lock and delivered records for one exact message.
pub fn message_id(channel: &str, alert: &Alert) -> String {
    format!("message/{}/{}", channel, content_fingerprint(alert))
}
