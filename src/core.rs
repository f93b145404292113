//! Core domain types and service traits for runwatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use crate::notification::{DispatchError, NotifyError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifies which pipe of the child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a batch of lines is being flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// The periodic notify timer fired.
    Tick,
    /// The monitored process finished.
    Final,
    /// An alert pattern matched.
    Alert,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Tick => "tick",
            FlushReason::Final => "final",
            FlushReason::Alert => "alert",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of accepted lines drained from the aggregator in one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationBatch {
    pub lines: Vec<String>,
    pub reason: FlushReason,
}

/// A file to be delivered to every destination.
///
/// The payload is shared so that replicating a job to N workers does not copy it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Arc<[u8]>,
    pub caption: String,
}

impl Attachment {
    /// Creates a `text/plain` attachment.
    pub fn text_file(filename: impl Into<String>, data: Vec<u8>, caption: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "text/plain".to_string(),
            data: data.into(),
            caption: caption.into(),
        }
    }
}

/// One logical notification, replicated to every destination worker.
#[derive(Debug, Clone, PartialEq)]
pub enum SendJob {
    Text(Arc<str>),
    File(Attachment),
}

// =============================================================================
// Service Traits
// =============================================================================

/// A single external notification target (chat webhook, bot API, generic webhook).
#[async_trait]
pub trait Destination: Send + Sync {
    /// A unique, descriptive name for the destination (e.g., "discord", "slack").
    /// Used for logging, metrics and per-destination configuration keys.
    fn name(&self) -> &str;

    /// The largest text message this destination accepts, in characters.
    fn max_text_chars(&self) -> usize;

    /// The largest attachment this destination accepts, in bytes.
    fn max_attach_bytes(&self) -> usize;

    /// Sends a plain text message.
    async fn send_text(&self, text: &str) -> Result<(), NotifyError>;

    /// Uploads a file with an accompanying caption.
    async fn send_file(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        caption: &str,
    ) -> Result<(), NotifyError>;
}

/// Receives every sanitized line produced by the monitored process.
pub trait LineSink: Send + Sync {
    fn on_line(&self, stream: StreamKind, line: &str);
}

/// Accepts logical notifications for delivery to every destination.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Enqueues one job for every destination.
    async fn broadcast(&self, job: SendJob) -> Result<(), DispatchError>;

    /// The smallest attachment ceiling across destinations, in bytes. Zero means unlimited.
    fn attachment_limit(&self) -> usize;
}
