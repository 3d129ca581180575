use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    notifier::SLACK_API_BASE,
    secret,
    store::{DatabaseConfig, DatabaseType},
    Error, Result,
};

const TOKEN_KEY: &str = "SLACK_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    #[serde(default)]
    pub ignore_rules: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
    /// Deadline for processing one delivery.
    pub invocation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub channel: String,
    pub channel_id: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub token_secret: Option<String>,
    pub api_url: String,
}

impl ServerConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from `lookup`; unset and blank variables
    /// are treated the same.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_type = match var("DATABASE_TYPE")
            .unwrap_or_else(|| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => DatabaseType::Sqlite,
            "postgres" => DatabaseType::Postgres,
            "memory" => DatabaseType::Memory,
            other => {
                return Err(Error::Config(format!("unknown DATABASE_TYPE: {}", other)));
            }
        };

        let config = Config {
            server: ServerConfig {
                addr: var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
                invocation_timeout_secs: match var("INVOCATION_TIMEOUT_SECS") {
                    Some(raw) => raw.parse().map_err(|_| {
                        Error::Config(format!("invalid INVOCATION_TIMEOUT_SECS: {}", raw))
                    })?,
                    None => 30,
                },
            },
            database: DatabaseConfig {
                db_type,
                sqlite_path: Some(
                    var("SQLITE_PATH")
                        .map(PathBuf::from)
                        .unwrap_or_else(|| PathBuf::from("data/alert-relay.db")),
                ),
                connection_string: var("DATABASE_URL"),
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            slack: SlackConfig {
                channel: var("SLACK_CHANNEL").unwrap_or_default(),
                channel_id: var("SLACK_CHANNEL_ID").unwrap_or_default(),
                token: var("SLACK_TOKEN"),
                token_secret: var("SLACK_TOKEN_SECRET"),
                api_url: var("SLACK_API_URL").unwrap_or_else(|| SLACK_API_BASE.to_string()),
            },
            ignore_rules: parse_ignore_rules(&var("IGNORE_RULES").unwrap_or_default()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slack.channel.is_empty() {
            return Err(Error::Config("SLACK_CHANNEL is required".to_string()));
        }
        if self.slack.channel_id.is_empty() {
            return Err(Error::Config("SLACK_CHANNEL_ID is required".to_string()));
        }
        if self.slack.token.is_none() && self.slack.token_secret.is_none() {
            return Err(Error::Config(
                "either SLACK_TOKEN or SLACK_TOKEN_SECRET is required".to_string(),
            ));
        }
        if self.server.invocation_timeout_secs == 0 {
            return Err(Error::Config(
                "INVOCATION_TIMEOUT_SECS must be positive".to_string(),
            ));
        }
        self.database.validate().map_err(Error::Config)
    }
}

impl SlackConfig {
    /// The API token, from `SLACK_TOKEN` or else from the secret reference.
    pub async fn resolve_token(&self) -> Result<String> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let reference = self
            .token_secret
            .as_deref()
            .ok_or_else(|| Error::Config("no Slack token configured".to_string()))?;

        secret::resolve(reference)
            .await?
            .remove(TOKEN_KEY)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Secret(format!("{} has no {} entry", reference, TOKEN_KEY)))
    }
}

/// Comma-separated alert names; blanks are dropped.
pub fn parse_ignore_rules(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(str::to_string)
        .collect()
}
