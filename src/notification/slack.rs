//! A client for Slack.
//!
//! Text goes to the incoming webhook. Files need the Web API (`files.upload`)
//! with a bot token and a channel; without them a file degrades to text
//! messages holding the caption and the content in code blocks, each within
//! the text limit.

use super::{check_status, NotifyError};
use crate::config::SlackConfig;
use crate::core::Destination;
use crate::formatting::{chunk_message, wrap_code_block};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

pub const MAX_TEXT_CHARS: usize = 3500;
pub const MAX_ATTACH_BYTES: usize = 20_000_000;

/// A client for sending messages and files to Slack.
pub struct SlackClient {
    http: Client,
    webhook_url: Option<String>,
    bot_token: Option<String>,
    channel: Option<String>,
    api_base: String,
    max_attach_bytes: usize,
}

fn present(value: &Option<String>) -> Option<String> {
    value.clone().filter(|s| !s.trim().is_empty())
}

impl SlackClient {
    pub fn new(http: Client, config: &SlackConfig) -> Self {
        Self {
            http,
            webhook_url: present(&config.webhook_url),
            bot_token: present(&config.bot_token),
            channel: present(&config.channel),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_attach_bytes: MAX_ATTACH_BYTES,
        }
    }

    pub fn with_attach_limit(mut self, bytes: Option<usize>) -> Self {
        if let Some(bytes) = bytes {
            self.max_attach_bytes = bytes;
        }
        self
    }

    fn web_api(&self) -> Option<(&str, &str)> {
        match (&self.bot_token, &self.channel) {
            (Some(token), Some(channel)) => Some((token.as_str(), channel.as_str())),
            _ => None,
        }
    }

    /// `chat.postMessage`, used when no incoming webhook is configured.
    async fn post_message(&self, token: &str, channel: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .http
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": text, "mrkdwn": true }))
            .send()
            .await?;
        check_status(self.name(), response).await
    }
}

#[async_trait]
impl Destination for SlackClient {
    fn name(&self) -> &str {
        "slack"
    }

    fn max_text_chars(&self) -> usize {
        MAX_TEXT_CHARS
    }

    fn max_attach_bytes(&self) -> usize {
        self.max_attach_bytes
    }

    #[instrument(skip_all, fields(chars = text.len()))]
    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        if let Some(url) = &self.webhook_url {
            let response = self
                .http
                .post(url)
                .json(&json!({ "text": text, "mrkdwn": true }))
                .send()
                .await?;
            check_status(self.name(), response).await?;
            debug!("Delivered text to Slack webhook");
            return Ok(());
        }
        match self.web_api() {
            Some((token, channel)) => self.post_message(token, channel, text).await,
            None => Err(NotifyError::Config(
                "slack incoming webhook url not set".to_string(),
            )),
        }
    }

    #[instrument(skip_all, fields(filename = %filename, bytes = data.len()))]
    async fn send_file(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        caption: &str,
    ) -> Result<(), NotifyError> {
        let Some((token, channel)) = self.web_api() else {
            debug!("No Slack upload credentials, sending file as text");
            let content = String::from_utf8_lossy(data);
            let text = format!("{}\n{}", caption, wrap_code_block(&content));
            for chunk in chunk_message(&text, MAX_TEXT_CHARS) {
                self.send_text(&chunk).await?;
            }
            return Ok(());
        };

        let file = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .text("channels", channel.to_string())
            .text("initial_comment", caption.to_string())
            .part("file", file);

        let response = self
            .http
            .post(format!("{}/files.upload", self.api_base))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        check_status(self.name(), response).await
    }
}
