use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde::{Deserialize, Serialize};

pub const STATUS_FIRING: &str = "firing";
pub const STATUS_RESOLVED: &str = "resolved";

pub const LABEL_ALERT_NAME: &str = "alertname";
pub const LABEL_SEVERITY: &str = "severity";

/// Prometheus renders timestamps with Go's default `time.Time` layout,
/// e.g. `2024-01-01 12:30:45.123456789 +0000 UTC`.
const PROMETHEUS_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f %z";

// One monitoring condition instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "startsAt", default)]
    pub starts_at: String,
}

// One inbound delivery unit as published on the topic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    #[serde(default)]
    pub alerts: Vec<Alert>,
    #[serde(rename = "commonLabels", default)]
    pub common_labels: HashMap<String, String>,
    #[serde(rename = "commonAnnotations", default)]
    pub common_annotations: HashMap<String, String>,
}

impl Alert {
    pub fn is_firing(&self) -> bool {
        self.status == STATUS_FIRING
    }

    pub fn name(&self) -> &str {
        self.labels
            .get(LABEL_ALERT_NAME)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn severity(&self) -> Option<&str> {
        self.labels.get(LABEL_SEVERITY).map(String::as_str)
    }

    /// Fills in batch-level labels and annotations the alert does not
    /// define itself, then normalizes `starts_at` to RFC3339.
    pub fn normalize(
        &mut self,
        common_labels: &HashMap<String, String>,
        common_annotations: &HashMap<String, String>,
    ) {
        for (k, v) in common_annotations {
            self.annotations
                .entry(k.clone())
                .or_insert_with(|| v.clone());
        }
        for (k, v) in common_labels {
            self.labels.entry(k.clone()).or_insert_with(|| v.clone());
        }
        if let Some(normalized) = normalize_timestamp(&self.starts_at) {
            self.starts_at = normalized;
        }
    }
}

impl Batch {
    /// Consumes the batch, yielding alerts with common fields flattened in.
    pub fn into_normalized_alerts(self) -> Vec<Alert> {
        let Batch {
            alerts,
            common_labels,
            common_annotations,
        } = self;

        alerts
            .into_iter()
            .map(|mut alert| {
                alert.normalize(&common_labels, &common_annotations);
                alert
            })
            .collect()
    }
}

/// Parses RFC3339 or Prometheus' native layout and renders RFC3339 with
/// whole seconds. Returns `None` if neither layout matches.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }

    // The trailing zone abbreviation carries no information beyond the
    // numeric offset before it.
    let (rest, zone) = raw.trim().rsplit_once(' ')?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    DateTime::parse_from_str(rest, PROMETHEUS_TIMESTAMP).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_normalize_rfc3339_is_stable() {
        assert_eq!(
            normalize_timestamp("2024-01-01T00:00:00Z").as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert_eq!(
            normalize_timestamp("2024-01-01T02:00:00.5+02:00").as_deref(),
            Some("2024-01-01T02:00:00+02:00")
        );
    }

    #[test]
    fn test_normalize_prometheus_format() {
        assert_eq!(
            normalize_timestamp("2024-01-01 12:30:45.123456789 +0000 UTC").as_deref(),
            Some("2024-01-01T12:30:45Z")
        );
        assert_eq!(
            normalize_timestamp("2024-06-01 08:00:00 +0200 CEST").as_deref(),
            Some("2024-06-01T08:00:00+02:00")
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert_eq!(normalize_timestamp("yesterday"), None);
        assert_eq!(normalize_timestamp(""), None);
        assert_eq!(normalize_timestamp("2024-01-01 12:30:45 +0000 +0000"), None);
    }

    #[test]
    fn test_alert_level_values_win_over_common_ones() {
        let mut alert = Alert {
            status: STATUS_FIRING.into(),
            labels: map(&[("alertname", "X"), ("severity", "critical")]),
            annotations: map(&[("summary", "own")]),
            starts_at: "not a timestamp".into(),
        };
        alert.normalize(
            &map(&[("severity", "warning"), ("cluster", "prod")]),
            &map(&[("summary", "common"), ("description", "shared")]),
        );

        assert_eq!(alert.labels["severity"], "critical");
        assert_eq!(alert.labels["cluster"], "prod");
        assert_eq!(alert.annotations["summary"], "own");
        assert_eq!(alert.annotations["description"], "shared");
        assert_eq!(alert.starts_at, "not a timestamp");
    }

    #[test]
    fn test_batch_deserializes_wire_shape() {
        let raw = r#"{
            "alerts": [
                {"status": "firing", "labels": {"alertname": "X"}, "annotations": {}, "startsAt": "2024-01-01 00:00:00 +0000 UTC"}
            ],
            "commonLabels": {"severity": "warning"},
            "commonAnnotations": {"summary": "s"},
            "receiver": "ignored"
        }"#;
        let batch: Batch = serde_json::from_str(raw).unwrap();
        let alerts = batch.into_normalized_alerts();

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name(), "X");
        assert_eq!(alerts[0].severity(), Some("warning"));
        assert_eq!(alerts[0].annotations["summary"], "s");
        assert_eq!(alerts[0].starts_at, "2024-01-01T00:00:00Z");
        assert!(alerts[0].is_firing());
    }
}
