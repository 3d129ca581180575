//! Entry point for deliveries: pub/sub envelopes and bare batches.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    alert::Batch,
    metrics,
    processor::Processor,
    Error, Result,
};

/// One pub/sub delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "Records", default)]
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Topic the batch was published on.
    #[serde(alias = "TopicArn")]
    pub topic: String,
    /// JSON-encoded [`Batch`].
    #[serde(alias = "Message")]
    pub message: String,
}

#[derive(Clone)]
pub struct Handler {
    processor: Arc<Processor>,
}

impl Handler {
    pub fn new(processor: Arc<Processor>) -> Self {
        Self { processor }
    }

    /// Handles every record of `event`. A record that fails to decode or
    /// process does not stop its siblings; all failures are joined.
    pub async fn process_event(&self, event: Event, cancel: &CancellationToken) -> Result<()> {
        let mut errors = Vec::new();

        for record in event.records {
            let batch: Batch = match serde_json::from_str(&record.message) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(
                        topic = %record.topic,
                        message = %record.message.replace('\n', " "),
                        error = %e,
                        "Error un-marshalling message"
                    );
                    metrics::record_delivery(metrics::RECORD_MALFORMED);
                    errors.push(Error::from(e));
                    continue;
                }
            };

            match self.process_batch(&record.topic, batch, cancel).await {
                Ok(()) => metrics::record_delivery(metrics::RECORD_OK),
                Err(e) => {
                    metrics::record_delivery(metrics::RECORD_FAILED);
                    errors.push(e);
                }
            }
        }

        Error::join(errors)
    }

    /// Normalizes the alerts of `batch` and processes them in order.
    pub async fn process_batch(
        &self,
        topic: &str,
        batch: Batch,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut errors = Vec::new();

        for alert in batch.into_normalized_alerts() {
            match self.processor.process_alert(topic, &alert, cancel).await {
                Ok(delivery) => debug!(?delivery, "Processed alert"),
                Err(e) => errors.push(e),
            }
        }

        Error::join(errors)
    }
}
