#![allow(dead_code)]
//! In-process destinations that record what they are asked to send.

use async_trait::async_trait;
use runwatch::core::Destination;
use runwatch::notification::NotifyError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    File {
        filename: String,
        caption: String,
        data: Vec<u8>,
    },
}

/// Records every send. Optionally fails the first `fail_first` attempts.
#[derive(Debug)]
pub struct RecordingDestination {
    name: String,
    max_text_chars: usize,
    max_attach_bytes: usize,
    fail_first: AtomicU32,
    pub sent: Mutex<Vec<Sent>>,
    notify: Notify,
}

impl RecordingDestination {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_limits(name, 4000, 1_000_000)
    }

    pub fn with_limits(name: &str, max_text_chars: usize, max_attach_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            max_text_chars,
            max_attach_bytes,
            fail_first: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    pub fn failing_first(name: &str, failures: u32) -> Arc<Self> {
        let destination = Self::new(name);
        destination.fail_first.store(failures, Ordering::SeqCst);
        destination
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t),
                Sent::File { .. } => None,
            })
            .collect()
    }

    pub fn files(&self) -> Vec<(String, String, Vec<u8>)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::File {
                    filename,
                    caption,
                    data,
                } => Some((filename, caption, data)),
                Sent::Text(_) => None,
            })
            .collect()
    }

    pub async fn wait_for_count(&self, target: usize, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.sent.lock().unwrap().len() >= target {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .expect("Timed out waiting for notifications");
    }

    fn should_fail(&self) -> bool {
        self.fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn record(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Destination for RecordingDestination {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_text_chars(&self) -> usize {
        self.max_text_chars
    }

    fn max_attach_bytes(&self) -> usize {
        self.max_attach_bytes
    }

    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        if self.should_fail() {
            return Err(NotifyError::Config("injected failure".to_string()));
        }
        self.record(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_file(
        &self,
        filename: &str,
        _content_type: &str,
        data: &[u8],
        caption: &str,
    ) -> Result<(), NotifyError> {
        if self.should_fail() {
            return Err(NotifyError::Config("injected failure".to_string()));
        }
        self.record(Sent::File {
            filename: filename.to_string(),
            caption: caption.to_string(),
            data: data.to_vec(),
        });
        Ok(())
    }
}
