//! Per-alert delivery protocol.
//!
//! Each alert goes through: check for an earlier delivery of the same
//! content, take the short dedup lock, resolve the thread, publish, record.
//! Until a publish is confirmed (or an earlier delivery is found) the alert
//! counts as unpublished, and whatever ends the attempt, an unpublished
//! alert gets one final un-threaded post. Broken dedup infrastructure can
//! cause duplicate posts but never a lost alert.

use std::collections::HashSet;
use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    alert::Alert,
    fingerprint::{content_fingerprint, labels_fingerprint, message_id, thread_id},
    metrics,
    notifier::Notifier,
    store::{LeaseStore, LOCK_TTL, MESSAGE_TTL, THREAD_TTL},
    Error, Result,
};

/// How an alert left the processor without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Published { message_ts: String, thread_ts: String },
    AlreadyDelivered { message_ts: String },
    Ignored,
    EmergencyPublished,
}

pub struct Processor {
    ignore_rules: HashSet<String>,
    store: LeaseStore,
    notifier: Notifier,
}

impl Processor {
    pub fn new(ignore_rules: HashSet<String>, store: LeaseStore, notifier: Notifier) -> Self {
        Self {
            ignore_rules,
            store,
            notifier,
        }
    }

    pub fn channel_name(&self) -> &str {
        self.notifier.channel_name()
    }

    /// Delivers one normalized alert received on `topic`.
    ///
    /// Lock contention is reported as [`Error::AlreadyLocked`] after the
    /// alert has been emergency-published.
    pub async fn process_alert(
        &self,
        topic: &str,
        alert: &Alert,
        cancel: &CancellationToken,
    ) -> Result<Delivery> {
        let span = info_span!(
            "alert",
            alert_fingerprint = %content_fingerprint(alert),
            alert_labels_fingerprint = %labels_fingerprint(alert),
        );

        async move {
            if self.ignore_rules.contains(alert.name()) {
                info!(alert = ?alert, "Skipped the alert according to ignore-rules configuration");
                metrics::record_alert(metrics::OUTCOME_IGNORED);
                return Ok(Delivery::Ignored);
            }

            let mut should_publish = true;
            let result = self.deliver(topic, alert, cancel, &mut should_publish).await;
            self.finalize(alert, should_publish, result).await
        }
        .instrument(span)
        .await
    }

    async fn deliver(
        &self,
        topic: &str,
        alert: &Alert,
        cancel: &CancellationToken,
        should_publish: &mut bool,
    ) -> Result<Delivery> {
        let channel = self.notifier.channel_name();
        let message_id = message_id(channel, alert);
        let thread_id = thread_id(channel, alert);

        let delivered = guarded(
            cancel,
            "check delivered",
            self.store.get_message_ts(topic, &message_id),
        )
        .await?;
        if let Some(message_ts) = delivered {
            *should_publish = false;
            debug!(%message_ts, "Alert already published");
            return Ok(Delivery::AlreadyDelivered { message_ts });
        }

        let locked = guarded(
            cancel,
            "lock",
            self.store.try_acquire(topic, &message_id, LOCK_TTL),
        )
        .await?;
        if !locked {
            info!("Another sender is publishing the same alert");
            return Err(Error::AlreadyLocked);
        }

        let existing_thread = guarded(
            cancel,
            "resolve thread",
            self.store.get_thread_ts(topic, &thread_id),
        )
        .await?;

        let message_ts = guarded(
            cancel,
            "publish",
            self.notifier.publish(existing_thread.as_deref(), alert),
        )
        .await?;
        *should_publish = false;
        info!(alert = ?alert, %message_ts, "Published alert");

        // The message is in the channel; bookkeeping below is best-effort.
        let thread_ts = match existing_thread {
            Some(thread_ts) => thread_ts,
            None => {
                let recorded = guarded(
                    cancel,
                    "record thread",
                    self.store.set_thread_ts(topic, &thread_id, &message_ts, THREAD_TTL),
                )
                .await;
                if let Err(e) = recorded {
                    warn!(error = %e, "Failed to record thread timestamp");
                }
                message_ts.clone()
            }
        };

        let recorded = guarded(
            cancel,
            "record delivery",
            self.store.set_message_ts(topic, &message_id, &message_ts, MESSAGE_TTL),
        )
        .await;
        if let Err(e) = recorded {
            warn!(error = %e, "Failed to record delivered message");
        }

        tokio::select! {
            _ = cancel.cancelled() => debug!("Cancelled before updating reaction"),
            _ = self.notifier.update_reaction(&thread_ts, alert) => {}
        }

        Ok(Delivery::Published {
            message_ts,
            thread_ts,
        })
    }

    /// Runs on every exit from [`Self::deliver`]. An alert that was neither
    /// published nor found delivered gets one un-threaded post; its failure
    /// is joined into the result and not retried.
    async fn finalize(
        &self,
        alert: &Alert,
        should_publish: bool,
        result: Result<Delivery>,
    ) -> Result<Delivery> {
        if !should_publish {
            match &result {
                Ok(Delivery::AlreadyDelivered { .. }) => {
                    metrics::record_alert(metrics::OUTCOME_DELIVERED)
                }
                _ => metrics::record_alert(metrics::OUTCOME_PUBLISHED),
            }
            return result;
        }

        let mut errors: Vec<Error> = result.err().into_iter().collect();
        if errors.iter().all(Error::is_contention) {
            metrics::record_alert(metrics::OUTCOME_CONTENDED);
        }

        match self.notifier.publish(None, alert).await {
            Ok(message_ts) => {
                warn!(alert = ?alert, %message_ts, "Emergency-published alert");
                metrics::record_alert(metrics::OUTCOME_EMERGENCY);
            }
            Err(e) => {
                metrics::record_alert(metrics::OUTCOME_FAILED);
                errors.push(e);
            }
        }

        Error::join(errors).map(|()| Delivery::EmergencyPublished)
    }
}

/// Runs `call` unless `cancel` fires first.
async fn guarded<T>(
    cancel: &CancellationToken,
    step: &'static str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled(step)),
        result = call => result,
    }
}
