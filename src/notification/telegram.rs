//! A client for the Telegram Bot API.

use super::{check_status, NotifyError};
use crate::config::TelegramConfig;
use crate::core::Destination;
use crate::formatting::escape_markdown_v2;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use std::borrow::Cow;
use tracing::instrument;

/// Kept below the 4096 limit of the API.
pub const MAX_TEXT_CHARS: usize = 3800;
pub const MAX_ATTACH_BYTES: usize = 45_000_000;

const MARKDOWN_V2: &str = "MarkdownV2";

pub struct TelegramClient {
    http: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    parse_mode: String,
    max_attach_bytes: usize,
}

impl TelegramClient {
    pub fn new(http: Client, config: &TelegramConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone().unwrap_or_default(),
            chat_id: config.chat_id.clone().unwrap_or_default(),
            parse_mode: config.parse_mode.clone(),
            max_attach_bytes: MAX_ATTACH_BYTES,
        }
    }

    pub fn with_attach_limit(mut self, bytes: Option<usize>) -> Self {
        if let Some(bytes) = bytes {
            self.max_attach_bytes = bytes;
        }
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    fn escape<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.parse_mode == MARKDOWN_V2 {
            Cow::Owned(escape_markdown_v2(text))
        } else {
            Cow::Borrowed(text)
        }
    }
}

#[async_trait]
impl Destination for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    fn max_text_chars(&self) -> usize {
        MAX_TEXT_CHARS
    }

    fn max_attach_bytes(&self) -> usize {
        self.max_attach_bytes
    }

    #[instrument(skip_all, fields(chars = text.len()))]
    async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        let mut body = json!({
            "chat_id": self.chat_id,
            "text": self.escape(text),
            "disable_web_page_preview": true,
        });
        if !self.parse_mode.is_empty() {
            body["parse_mode"] = json!(self.parse_mode);
        }

        let response = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        check_status(self.name(), response).await
    }

    #[instrument(skip_all, fields(filename = %filename, bytes = data.len()))]
    async fn send_file(
        &self,
        filename: &str,
        content_type: &str,
        data: &[u8],
        caption: &str,
    ) -> Result<(), NotifyError> {
        let document = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let mut form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", self.escape(caption).into_owned());
        if !self.parse_mode.is_empty() {
            form = form.text("parse_mode", self.parse_mode.clone());
        }
        let form = form.part("document", document);

        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        check_status(self.name(), response).await
    }
}
