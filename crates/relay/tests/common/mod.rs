#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alert_relay::{
    alert::Alert,
    notifier::{ChatClient, ChatMessage, ItemRef, Notifier, ReactionOutcome},
    processor::Processor,
    store::{KvStore, LeaseKey, LeaseRecord, LeaseStore, PutOutcome},
    Error, Result,
};
use async_trait::async_trait;

pub const CHANNEL: &str = "alerts";
pub const CHANNEL_ID: &str = "C123";
pub const TOPIC: &str = "arn:topic:alerts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Added(ItemRef, String),
    Removed(ItemRef, String),
}

/// Chat backend that keeps everything it is asked to do.
#[derive(Default)]
pub struct RecordingChat {
    posts: Mutex<Vec<ChatMessage>>,
    reactions: Mutex<Vec<Reaction>>,
    sequence: AtomicUsize,
    fail_posts: AtomicBool,
}

impl RecordingChat {
    pub fn posts(&self) -> Vec<ChatMessage> {
        self.posts.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<Reaction> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn post_message(&self, message: &ChatMessage) -> Result<String> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(Error::Slack("chat.postMessage: service_unavailable".into()));
        }
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.posts.lock().unwrap().push(message.clone());
        Ok(format!("{}.{:06}", 1_704_067_200 + n, n))
    }

    async fn add_reaction(&self, item: &ItemRef, emoji: &str) -> Result<ReactionOutcome> {
        self.reactions
            .lock()
            .unwrap()
            .push(Reaction::Added(item.clone(), emoji.to_string()));
        Ok(ReactionOutcome::Applied)
    }

    async fn remove_reaction(&self, item: &ItemRef, emoji: &str) -> Result<ReactionOutcome> {
        self.reactions
            .lock()
            .unwrap()
            .push(Reaction::Removed(item.clone(), emoji.to_string()));
        Ok(ReactionOutcome::NoReaction)
    }
}

/// Backend whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl KvStore for BrokenStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn create_if_absent(
        &self,
        _key: &LeaseKey,
        _record: &LeaseRecord,
        _ttl: Duration,
    ) -> Result<PutOutcome> {
        Err(Error::Store("connection refused".into()))
    }

    async fn get(&self, _key: &LeaseKey) -> Result<Option<LeaseRecord>> {
        Err(Error::Store("connection refused".into()))
    }

    async fn put(&self, _key: &LeaseKey, _record: &LeaseRecord, _ttl: Duration) -> Result<()> {
        Err(Error::Store("connection refused".into()))
    }

    async fn purge_expired(&self) -> Result<u64> {
        Err(Error::Store("connection refused".into()))
    }
}

pub fn processor(kv: Arc<dyn KvStore>, chat: Arc<RecordingChat>) -> Processor {
    Processor::new(
        HashSet::new(),
        LeaseStore::new(kv),
        Notifier::new(chat, CHANNEL, CHANNEL_ID),
    )
}

pub fn alert(name: &str, status: &str) -> Alert {
    Alert {
        status: status.to_string(),
        labels: [("alertname", name), ("severity", "critical")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        annotations: [("summary", "Disk full")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        starts_at: "2024-01-01T00:00:00Z".to_string(),
    }
}
