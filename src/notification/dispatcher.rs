//! Fans every notification out to one worker per destination.

use super::delivery::{deliver, RetryPolicy};
use crate::config::DeliveryConfig;
use crate::core::{Attachment, Destination, NotificationSink, SendJob};
use crate::formatting::chunk_message;
use crate::task_manager::TaskManager;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no notification destinations enabled")]
    NoDestinations,
    #[error("dispatcher closed")]
    Closed,
}

struct Worker {
    name: String,
    max_attach_bytes: usize,
    tx: async_channel::Sender<SendJob>,
}

/// Owns the destination workers.
///
/// Workers are fixed at construction. Each has its own bounded queue, so a
/// slow destination only delays the callers once its queue is full.
pub struct Dispatcher {
    workers: Vec<Worker>,
    closed: RwLock<bool>,
    tasks: TaskManager,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// Starts one worker per destination. Must be called inside a Tokio runtime.
    pub fn new(destinations: Vec<Arc<dyn Destination>>, config: &DeliveryConfig) -> Self {
        let tasks = TaskManager::new();
        let policy = RetryPolicy::from_config(config);
        let capacity = config.queue_capacity.max(1);

        let workers = destinations
            .into_iter()
            .map(|destination| {
                let (tx, rx) = async_channel::bounded(capacity);
                let name = destination.name().to_string();
                let max_attach_bytes = destination.max_attach_bytes();
                tasks.spawn(
                    format!("notify-{}", name),
                    run_worker(destination, rx, policy),
                );
                Worker {
                    name,
                    max_attach_bytes,
                    tx,
                }
            })
            .collect::<Vec<_>>();

        info!(
            destinations = ?workers.iter().map(|w| w.name.as_str()).collect::<Vec<_>>(),
            "Notification dispatcher started"
        );

        Self {
            workers,
            closed: RwLock::new(false),
            tasks,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }

    pub async fn broadcast_text(&self, text: &str) -> Result<(), DispatchError> {
        self.enqueue(SendJob::Text(Arc::from(text))).await
    }

    pub async fn broadcast_file(&self, attachment: Attachment) -> Result<(), DispatchError> {
        self.enqueue(SendJob::File(attachment)).await
    }

    async fn enqueue(&self, job: SendJob) -> Result<(), DispatchError> {
        if self.workers.is_empty() {
            return Err(DispatchError::NoDestinations);
        }
        // Held for the whole fan-out so that close() cannot split a job.
        let closed = self.closed.read().await;
        if *closed {
            return Err(DispatchError::Closed);
        }
        for worker in &self.workers {
            worker
                .tx
                .send(job.clone())
                .await
                .map_err(|_| DispatchError::Closed)?;
        }
        Ok(())
    }

    /// Closes every queue and waits for the workers to drain them.
    ///
    /// Workers still busy after `shutdown_timeout_secs` are aborted. Calling
    /// this more than once is a no-op.
    pub async fn close(&self) {
        {
            let mut closed = self.closed.write().await;
            if *closed {
                return;
            }
            *closed = true;
            for worker in &self.workers {
                worker.tx.close();
            }
        }

        let aborted = self.tasks.shutdown(Some(self.shutdown_timeout)).await;
        if aborted > 0 {
            warn!(aborted, "Pending notifications were abandoned at shutdown");
        } else {
            debug!("All notification workers drained");
        }
    }
}

#[async_trait]
impl NotificationSink for Dispatcher {
    async fn broadcast(&self, job: SendJob) -> Result<(), DispatchError> {
        self.enqueue(job).await
    }

    fn attachment_limit(&self) -> usize {
        self.workers
            .iter()
            .map(|w| w.max_attach_bytes)
            .filter(|bytes| *bytes > 0)
            .min()
            .unwrap_or(0)
    }
}

async fn run_worker(
    destination: Arc<dyn Destination>,
    rx: async_channel::Receiver<SendJob>,
    policy: RetryPolicy,
) {
    let name = destination.name().to_string();
    while let Ok(job) = rx.recv().await {
        match job {
            SendJob::Text(text) => {
                for chunk in chunk_message(&text, destination.max_text_chars()) {
                    deliver(&name, policy, || destination.send_text(&chunk)).await;
                }
            }
            SendJob::File(file) => {
                deliver(&name, policy, || {
                    destination.send_file(&file.filename, &file.content_type, &file.data, &file.caption)
                })
                .await;
            }
        }
    }
    debug!(destination = %name, "Notification queue drained");
}
