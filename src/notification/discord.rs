//! A client for Discord incoming webhooks.

use super::{check_status, NotifyError};
use crate::core::Destination;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

pub const MAX_TEXT_CHARS: usize = 1900;
pub const MAX_ATTACH_BYTES: usize = 8_000_000;

pub struct DiscordClient {
    http: Client,
    webhook_url: String,
    max_attach_bytes: usize,
}

impl DiscordClient {
    pub fn new(http: Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
            max_attach_bytes: MAX_ATTACH_BYTES,
        }
    }

    /// Overrides the built-in attachment ceiling.
    pub fn with_attach_limit(mut self, bytes: Option<usize>) -> Self {
        if let Some(bytes) = bytes {
            self.max_attach_bytes = bytes;
        }
        self
    }
}

#[async_trait]
impl Destination for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    fn max_text_chars(&self) -> usize {
        MAX_TEXT_CHARS
    }

    fn max_attach_bytes(&self) -> usize {
        self.max_attach_bytes
    }

    #[instrument(skip_all, fields(chars = text.len()))]
    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "content": text }))
            .send()
            .await?;
        check_status(self.name(), response).await?;
        debug!("Delivered text to Discord");
        Ok(())
    }

    #[instrument(skip_all, fields(filename = %filename, bytes = data.len()))]
    async fn send_file(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        caption: &str,
    ) -> Result<(), NotifyError> {
        let file = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .text("payload_json", json!({ "content": caption }).to_string())
            .part("file", file);

        let response = self
            .http
            .post(&self.webhook_url)
            .multipart(form)
            .send()
            .await?;
        check_status(self.name(), response).await
    }
}
