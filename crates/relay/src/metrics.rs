use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

pub const OUTCOME_PUBLISHED: &str = "published";
pub const OUTCOME_DELIVERED: &str = "delivered";
pub const OUTCOME_IGNORED: &str = "ignored";
pub const OUTCOME_CONTENDED: &str = "contended";
pub const OUTCOME_EMERGENCY: &str = "emergency";
pub const OUTCOME_FAILED: &str = "failed";

pub const RECORD_OK: &str = "ok";
pub const RECORD_MALFORMED: &str = "malformed";
pub const RECORD_FAILED: &str = "failed";

lazy_static! {
    pub static ref ALERTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "alert_relay_alerts_total",
        "Alerts processed, by outcome.",
        &["outcome"]
    )
    .expect("alert_relay_alerts_total is registered once");
    pub static ref RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "alert_relay_records_total",
        "Pub/sub records handled, by result.",
        &["result"]
    )
    .expect("alert_relay_records_total is registered once");
}

pub fn record_alert(outcome: &str) {
    ALERTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_delivery(result: &str) {
    RECORDS_TOTAL.with_label_values(&[result]).inc();
}

// Text exposition of the default registry
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        record_alert(OUTCOME_IGNORED);
        record_delivery(RECORD_MALFORMED);

        let text = gather_metrics();
        assert!(text.contains("alert_relay_alerts_total{outcome=\"ignored\"}"));
        assert!(text.contains("alert_relay_records_total{result=\"malformed\"}"));
    }
}
