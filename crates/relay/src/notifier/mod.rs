mod message;
mod slack;

pub use message::{follow_up_footer, render, Attachment, COLOR_DANGER, COLOR_GOOD, COLOR_WARNING};
pub use slack::{SlackClient, SLACK_API_BASE};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::{alert::Alert, Result};

pub const REACTION_FIRING: &str = "rotating_light";
pub const REACTION_RESOLVED: &str = "white_check_mark";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: String,
    pub attachment: Attachment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

// A posted message a reaction is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub channel: String,
    pub timestamp: String,
}

/// Result of a reaction change that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    Applied,
    /// The reaction was already there.
    AlreadyReacted,
    /// There was no reaction to remove.
    NoReaction,
}

/// Chat backend operations the relay relies on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Posts a message and returns its timestamp identifier.
    async fn post_message(&self, message: &ChatMessage) -> Result<String>;

    async fn add_reaction(&self, item: &ItemRef, emoji: &str) -> Result<ReactionOutcome>;

    async fn remove_reaction(&self, item: &ItemRef, emoji: &str) -> Result<ReactionOutcome>;
}

/// Posts alerts into one channel and keeps the status reaction on thread
/// roots current.
#[derive(Clone)]
pub struct Notifier {
    client: Arc<dyn ChatClient>,
    channel_name: String,
    channel_id: String,
}

impl Notifier {
    pub fn new(client: Arc<dyn ChatClient>, channel_name: &str, channel_id: &str) -> Self {
        Self {
            client,
            channel_name: channel_name.to_string(),
            channel_id: channel_id.to_string(),
        }
    }

    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Posts `alert`, as a reply when `thread_ts` is given. Returns the new
    /// message's timestamp.
    pub async fn publish(&self, thread_ts: Option<&str>, alert: &Alert) -> Result<String> {
        let message = ChatMessage {
            channel: self.channel_name.clone(),
            attachment: render(alert, thread_ts),
            thread_ts: thread_ts.map(str::to_string),
        };

        self.client.post_message(&message).await.map_err(|e| {
            error!(
                channel = %self.channel_name,
                thread_ts = thread_ts.unwrap_or_default(),
                error = %e,
                "Error publishing message to chat"
            );
            e
        })
    }

    /// Marks the thread root as firing or resolved. Failures are logged and
    /// otherwise ignored.
    pub async fn update_reaction(&self, thread_ts: &str, alert: &Alert) {
        let (add, remove) = if alert.is_firing() {
            (REACTION_FIRING, REACTION_RESOLVED)
        } else {
            (REACTION_RESOLVED, REACTION_FIRING)
        };
        let item = ItemRef {
            channel: self.channel_id.clone(),
            timestamp: thread_ts.to_string(),
        };

        if let Err(e) = self.client.add_reaction(&item, add).await {
            error!(
                channel = %self.channel_name,
                reaction = add,
                thread_ts,
                error = %e,
                "Error adding reaction"
            );
        }
        if let Err(e) = self.client.remove_reaction(&item, remove).await {
            error!(
                channel = %self.channel_name,
                reaction = remove,
                thread_ts,
                error = %e,
                "Error removing reaction"
            );
        }
    }
}
