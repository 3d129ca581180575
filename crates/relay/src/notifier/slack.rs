//! Slack Web API client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    notifier::{ChatClient, ChatMessage, ItemRef, ReactionOutcome},
    Error, Result,
};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            token: token.to_string(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: &str, body: &Value) -> Result<SlackResponse> {
        let resp = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        match resp.json::<SlackResponse>().await {
            Ok(parsed) => {
                debug!("Slack {} -> ok={} error={:?}", method, parsed.ok, parsed.error);
                Ok(parsed)
            }
            Err(_) if !status.is_success() => {
                Err(Error::Slack(format!("{} returned HTTP {}", method, status)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn react(
        &self,
        method: &str,
        item: &ItemRef,
        emoji: &str,
        benign: &str,
        benign_outcome: ReactionOutcome,
    ) -> Result<ReactionOutcome> {
        let body = json!({
            "channel": item.channel,
            "timestamp": item.timestamp,
            "name": emoji,
        });

        let resp = self.call(method, &body).await?;
        if resp.ok {
            return Ok(ReactionOutcome::Applied);
        }
        match resp.error.as_deref() {
            Some(code) if code == benign => Ok(benign_outcome),
            Some(code) => Err(Error::Slack(format!("{}: {}", method, code))),
            None => Err(Error::Slack(format!("{}: unknown error", method))),
        }
    }
}

#[async_trait]
impl ChatClient for SlackClient {
    async fn post_message(&self, message: &ChatMessage) -> Result<String> {
        let mut body = json!({
            "channel": message.channel,
            "attachments": [message.attachment],
        });
        if let Some(ts) = &message.thread_ts {
            body["thread_ts"] = json!(ts);
        }

        let resp = self.call("chat.postMessage", &body).await?;
        if !resp.ok {
            let code = resp.error.unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::Slack(format!("chat.postMessage: {}", code)));
        }
        resp.ts
            .filter(|ts| !ts.is_empty())
            .ok_or_else(|| Error::Slack("chat.postMessage: response missing ts".to_string()))
    }

    async fn add_reaction(&self, item: &ItemRef, emoji: &str) -> Result<ReactionOutcome> {
        self.react(
            "reactions.add",
            item,
            emoji,
            "already_reacted",
            ReactionOutcome::AlreadyReacted,
        )
        .await
    }

    async fn remove_reaction(&self, item: &ItemRef, emoji: &str) -> Result<ReactionOutcome> {
        self.react(
            "reactions.remove",
            item,
            emoji,
            "no_reaction",
            ReactionOutcome::NoReaction,
        )
        .await
    }
}
