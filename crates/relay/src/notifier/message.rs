//! Rendering of alerts into chat attachments.

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::Alert;

pub const COLOR_DANGER: &str = "danger";
pub const COLOR_WARNING: &str = "warning";
pub const COLOR_GOOD: &str = "good";

const FOLLOW_UP: &str = "(follow-up)";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub color: String,
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

/// Renders `alert`; a reply into an existing thread gets a footer pointing
/// at the thread's root post.
pub fn render(alert: &Alert, thread_ts: Option<&str>) -> Attachment {
    Attachment {
        color: color(alert).to_string(),
        title: format!("{}: {}", alert.status.to_uppercase(), alert.name()),
        text: body(alert),
        footer: thread_ts.map(follow_up_footer),
    }
}

fn color(alert: &Alert) -> &'static str {
    if !alert.is_firing() {
        return COLOR_GOOD;
    }
    match alert.severity() {
        Some("critical") => COLOR_DANGER,
        Some("warning") => COLOR_WARNING,
        _ => COLOR_GOOD,
    }
}

fn body(alert: &Alert) -> String {
    let mut text = String::new();

    if let Some(severity) = alert.severity() {
        text += &format!("Severity: `{}`\n", severity);
    }
    if let Some(summary) = alert.annotations.get("summary") {
        text += &format!("Summary: `{}`\n", summary);
    }
    if let Some(description) = alert.annotations.get("description") {
        text += &format!("\n{}\n\n", description);
    }
    if let Some(message) = alert.annotations.get("message") {
        text += &format!("\n{}\n\n", message);
    }
    if !alert.starts_at.is_empty() {
        text += &format!("Started at: `{}`\n", alert.starts_at);
    }
    if let Some(account) = alert.labels.get("aws_account") {
        text += &format!("AWS account: `{}`\n", account);
    }
    if let Some(cluster) = alert.labels.get("cluster") {
        text += &format!("Kubernetes cluster: `{}`\n", cluster);
    }
    if let Some(namespace) = alert.labels.get("namespace") {
        text += &format!("Kubernetes namespace: `{}`\n", namespace);
    }

    text
}

/// Message timestamps are `<unix seconds>.<fraction>`.
pub fn follow_up_footer(thread_ts: &str) -> String {
    let Ok(seconds) = thread_ts.parse::<f64>() else {
        return FOLLOW_UP.to_string();
    };
    if !seconds.is_finite() || seconds < 0.0 {
        return FOLLOW_UP.to_string();
    }

    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9) as u32;
    match Utc.timestamp_opt(whole as i64, nanos).single() {
        Some(published) => format!(
            "(follow-up to the alert published at {})",
            published.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        None => FOLLOW_UP.to_string(),
    }
}
