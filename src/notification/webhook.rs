//! A client for generic HTTP webhooks.

use super::{check_status, NotifyError};
use crate::core::Destination;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::instrument;

pub const MAX_TEXT_CHARS: usize = 6000;
pub const MAX_ATTACH_BYTES: usize = 10_000_000;

/// Posts `{"text": ...}` as JSON and files as multipart `caption` + `file`.
pub struct WebhookClient {
    http: Client,
    url: String,
    headers: HeaderMap,
    max_attach_bytes: usize,
}

impl WebhookClient {
    /// Fails when a configured header name or value is not valid HTTP.
    pub fn new(
        http: Client,
        url: impl Into<String>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| NotifyError::Config(format!("invalid webhook header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| NotifyError::Config(format!("invalid value for header '{}': {}", name, e)))?;
            map.insert(name, value);
        }
        Ok(Self {
            http,
            url: url.into(),
            headers: map,
            max_attach_bytes: MAX_ATTACH_BYTES,
        })
    }

    pub fn with_attach_limit(mut self, bytes: Option<usize>) -> Self {
        if let Some(bytes) = bytes {
            self.max_attach_bytes = bytes;
        }
        self
    }
}

#[async_trait]
impl Destination for WebhookClient {
    fn name(&self) -> &str {
        "webhook"
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
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&json!({ "text": text }))
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
        let file = Part::bytes(data.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = Form::new()
            .text("caption", caption.to_string())
            .part("file", file);

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .multipart(form)
            .send()
            .await?;
        check_status(self.name(), response).await
    }
}
