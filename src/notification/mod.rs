//! Delivery of output batches to chat and webhook destinations.
//!
//! The [`aggregator`] decides what to send and when, the [`dispatcher`] fans
//! every send out to one worker per destination, and each worker drives the
//! retry state machine in [`delivery`] against a [`Destination`] client.
pub mod aggregator;
pub mod delivery;
pub mod discord;
pub mod dispatcher;
pub mod http;
pub mod slack;
pub mod telegram;
pub mod webhook;

use crate::config::{Config, DestinationKind};
use crate::core::Destination;
use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

pub use aggregator::Aggregator;
pub use dispatcher::{DispatchError, Dispatcher};

/// Failure of a single delivery attempt.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{destination} responded with status {status}: {body}")]
    Status {
        destination: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Config(String),
}

/// Maps any status of 300 or above to [`NotifyError::Status`].
pub(crate) async fn check_status(
    destination: &str,
    response: reqwest::Response,
) -> Result<(), NotifyError> {
    let status = response.status();
    if status.as_u16() < 300 {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Status {
        destination: destination.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Expands `all` and removes duplicates, keeping a stable order.
pub fn expand_callbacks(callbacks: &[DestinationKind]) -> Vec<DestinationKind> {
    let mut set = BTreeSet::new();
    for kind in callbacks {
        match kind {
            DestinationKind::All => set.extend(DestinationKind::CONCRETE),
            other => {
                set.insert(*other);
            }
        }
    }
    set.into_iter().collect()
}

/// Builds one client per enabled destination.
///
/// Fails when an enabled destination lacks the credentials it needs.
pub fn build_destinations(
    config: &Config,
    http: &reqwest::Client,
) -> Result<Vec<Arc<dyn Destination>>> {
    let limits = &config.notify.attach.part_max_bytes;
    let mut out: Vec<Arc<dyn Destination>> = Vec::new();

    for kind in expand_callbacks(&config.notify.callbacks) {
        let ceiling = limits.get(kind.as_str()).copied().filter(|b| *b > 0);
        let client: Arc<dyn Destination> = match kind {
            DestinationKind::Discord => {
                let Some(url) = non_empty(&config.discord.webhook_url) else {
                    bail!("discord enabled but discord.webhook_url is empty");
                };
                Arc::new(discord::DiscordClient::new(http.clone(), url).with_attach_limit(ceiling))
            }
            DestinationKind::Slack => {
                let slack = &config.slack;
                if non_empty(&slack.webhook_url).is_none() && non_empty(&slack.bot_token).is_none() {
                    bail!("slack enabled but neither slack.webhook_url nor slack.bot_token is set");
                }
                Arc::new(slack::SlackClient::new(http.clone(), slack).with_attach_limit(ceiling))
            }
            DestinationKind::Telegram => {
                let telegram = &config.telegram;
                if non_empty(&telegram.bot_token).is_none() || non_empty(&telegram.chat_id).is_none() {
                    bail!("telegram enabled but telegram.bot_token or telegram.chat_id is not set");
                }
                Arc::new(telegram::TelegramClient::new(http.clone(), telegram).with_attach_limit(ceiling))
            }
            DestinationKind::Webhook => {
                let Some(url) = non_empty(&config.webhook.url) else {
                    bail!("webhook enabled but webhook.url is empty");
                };
                Arc::new(
                    webhook::WebhookClient::new(http.clone(), url, &config.webhook.headers)?
                        .with_attach_limit(ceiling),
                )
            }
            DestinationKind::All => continue,
        };
        out.push(client);
    }

    Ok(out)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
