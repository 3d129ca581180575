pub mod alert;
pub mod config;
pub mod fingerprint;
pub mod handler;
pub mod metrics;
pub mod notifier;
pub mod processor;
pub mod secret;
pub mod server;
pub mod store;

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Slack(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("Timed out after {timeout_ms}ms: {operation}")]
    Timeout { operation: &'static str, timeout_ms: u128 },
    #[error("Cancelled: {0}")]
    Cancelled(&'static str),
    #[error("Secret error: {0}")]
    Secret(String),
    #[error("the message is already locked, let's retry later")]
    AlreadyLocked,
    #[error("{}", Joined(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    /// Combines collected errors. Nested joins are flattened and a single
    /// error is returned as-is.
    pub fn join(errors: Vec<Error>) -> Result<()> {
        let mut flat = Vec::with_capacity(errors.len());
        for err in errors {
            match err {
                Error::Multiple(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Ok(()),
            1 => Err(flat.remove(0)),
            _ => Err(Error::Multiple(flat)),
        }
    }

    /// True when the failure is only lock contention with another sender.
    pub fn is_contention(&self) -> bool {
        match self {
            Error::AlreadyLocked => true,
            Error::Multiple(errors) => {
                !errors.is_empty() && errors.iter().all(Error::is_contention)
            }
            _ => false,
        }
    }
}

struct Joined<'a>(&'a [Error]);

impl fmt::Display for Joined<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
