//! Bounded log ingestion buffer.
//!
//! Logs are validated and appended to an in-memory buffer; a background
//! loop flushes batches to storage when the buffer crosses its size
//! threshold or a periodic tick fires. A failed batch insert is requeued
//! at the head of the buffer and retried indefinitely.

#[cfg(test)]
mod tests;

use apiwatch_common::types::ApplicationLog;
use apiwatch_storage::LogStore;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing;

const INSERT_TIMEOUT: Duration = Duration::from_secs(10);

/// Rejection reasons surfaced to the ingestion API as 400-class errors.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("invalid log payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{field} is required")]
    Validation { field: &'static str },
}

#[derive(Debug, Clone)]
pub struct IngesterConfig {
    /// Buffer length that triggers a flush signal.
    pub buffer_size: usize,
    /// Maximum logs taken per flush.
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            batch_size: 500,
            flush_interval: Duration::from_secs(5),
        }
    }
}

pub struct Ingester {
    buffer: Mutex<VecDeque<ApplicationLog>>,
    config: IngesterConfig,
    storage: Arc<dyn LogStore>,
    flush_tx: mpsc::Sender<()>,
    flush_rx: tokio::sync::Mutex<Option<mpsc::Receiver<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Ingester {
    pub fn new(storage: Arc<dyn LogStore>, config: IngesterConfig) -> Arc<Self> {
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            buffer: Mutex::new(VecDeque::with_capacity(config.buffer_size)),
            config,
            storage,
            flush_tx,
            flush_rx: tokio::sync::Mutex::new(Some(flush_rx)),
            shutdown_tx,
        })
    }

    /// Parses and validates a raw log, stamps defaults, and appends it to
    /// the buffer. Posts a coalesced flush signal when the size threshold
    /// is crossed.
    pub fn ingest(&self, raw: serde_json::Value) -> Result<(), IngestError> {
        let mut log: ApplicationLog = serde_json::from_value(raw)?;
        validate(&log)?;

        if log.id.is_empty() {
            log.id = apiwatch_common::id::next_id();
        }
        if log.timestamp.is_none() {
            log.timestamp = Some(Utc::now());
        }

        let should_flush = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
            buffer.push_back(log);
            buffer.len() >= self.config.buffer_size
        };

        if should_flush {
            // a pending signal already covers this trigger
            let _ = self.flush_tx.try_send(());
        }

        Ok(())
    }

    /// Background flush loop; exits after a final drain once [`stop`] is
    /// called.
    ///
    /// [`stop`]: Ingester::stop
    pub async fn run(&self) {
        let Some(mut flush_rx) = self.flush_rx.lock().await.take() else {
            tracing::error!("Ingester flush loop already running");
            return;
        };
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut tick = tokio::time::interval(self.config.flush_interval);
        tick.tick().await;

        tracing::info!(
            buffer_size = self.config.buffer_size,
            batch_size = self.config.batch_size,
            flush_interval_secs = self.config.flush_interval.as_secs(),
            "Ingester flush loop started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => self.flush_once().await,
                _ = flush_rx.recv() => self.flush_once().await,
                _ = shutdown.changed() => {
                    self.drain().await;
                    tracing::info!("Ingester flush loop stopped");
                    return;
                }
            }
        }
    }

    /// Signals the flush loop to perform a final drain and exit.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Takes one batch from the head of the buffer and inserts it. On
    /// failure the batch is prepended back in its original position so the
    /// next trigger retries it.
    pub(crate) async fn flush_once(&self) {
        let batch: Vec<ApplicationLog> = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
            if buffer.is_empty() {
                return;
            }
            let take = self.config.batch_size.min(buffer.len());
            buffer.drain(..take).collect()
        };

        let insert = tokio::time::timeout(
            INSERT_TIMEOUT,
            self.storage.batch_insert_logs(&batch),
        )
        .await;

        let failure = match insert {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("insert timed out after {INSERT_TIMEOUT:?}")),
        };

        if let Some(error) = failure {
            tracing::error!(
                batch = batch.len(),
                error = %error,
                "Batch insert failed, requeueing"
            );
            let mut buffer = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
            for log in batch.into_iter().rev() {
                buffer.push_front(log);
            }
        }
    }

    /// Flushes until the buffer is empty or storage stops making progress.
    async fn drain(&self) {
        loop {
            let before = self.buffer_len();
            if before == 0 {
                return;
            }
            self.flush_once().await;
            if self.buffer_len() >= before {
                tracing::warn!(
                    remaining = self.buffer_len(),
                    "Final drain abandoned, storage unavailable"
                );
                return;
            }
        }
    }
}

fn validate(log: &ApplicationLog) -> Result<(), IngestError> {
    if log.application_id.is_empty() {
        return Err(IngestError::Validation {
            field: "application_id",
        });
    }
    if log.service_name.is_empty() {
        return Err(IngestError::Validation {
            field: "service_name",
        });
    }
    if log.message.is_empty() {
        return Err(IngestError::Validation { field: "message" });
    }
    Ok(())
}
