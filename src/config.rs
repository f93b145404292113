//! Configuration management for runwatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer built-in defaults, an optional TOML or YAML file, a named
//! profile from that file, `RUNWATCH_` environment variables and finally the
//! command-line flags.

use crate::cli::Cli;
use crate::sanitize::StripPolicy;
use crate::utils::parse_extended_duration;
use anyhow::{bail, Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// The logging level used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Path of the JSON-lines event file.
    pub event_output: Option<PathBuf>,
    /// Path of the file that records sanitized output lines.
    pub output_file: Option<PathBuf>,
    pub output_mode: OutputMode,
    /// Force ANSI stripping regardless of `notify.strip_ansi`.
    pub no_color: bool,
    /// Echo the child's output to this process's terminal.
    pub tty_output: bool,
    pub transport: TransportConfig,
    pub notify: NotifyConfig,
    pub discord: DiscordConfig,
    pub slack: SlackConfig,
    pub telegram: TelegramConfig,
    pub webhook: WebhookConfig,
}

/// How the output file is written.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Every line, as it arrives.
    #[default]
    Raw,
    /// The sorted set of distinct lines, written when the run ends.
    SortDedup,
}

/// Outbound HTTP settings shared by every destination client.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    /// Proxy URL (`http://`, `https://` or `socks5://`).
    pub proxy: Option<String>,
    /// `user:password` credentials for the proxy.
    pub proxy_auth: Option<String>,
    /// Comma-separated hosts that bypass the proxy.
    pub no_proxy: Option<String>,
    /// Ignore `HTTP_PROXY`, `HTTPS_PROXY` and friends from the environment.
    pub ignore_env_proxy: bool,
    /// Accept invalid TLS certificates.
    pub insecure: bool,
    pub timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            proxy_auth: None,
            no_proxy: None,
            ignore_env_proxy: false,
            insecure: false,
            timeout_secs: 25,
        }
    }
}

/// A notification target kind, as named on the command line.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Discord,
    Slack,
    Telegram,
    Webhook,
    /// Expands to every concrete kind.
    All,
}

impl DestinationKind {
    pub const CONCRETE: [DestinationKind; 4] = [
        DestinationKind::Discord,
        DestinationKind::Slack,
        DestinationKind::Telegram,
        DestinationKind::Webhook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Discord => "discord",
            DestinationKind::Slack => "slack",
            DestinationKind::Telegram => "telegram",
            DestinationKind::Webhook => "webhook",
            DestinationKind::All => "all",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleTrigger {
    Start,
    Finish,
}

/// How a flushed batch is turned into messages.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyMode {
    TextOnly,
    AttachOnly,
    #[default]
    Auto,
    Summary,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextSelect {
    #[default]
    All,
    Head,
    Tail,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Every line, split into parts that fit the smallest destination limit.
    #[default]
    Split,
    /// Only the last `attach.tail_lines` lines, as one file.
    Tail,
}

/// Configuration for the notification pipeline.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// Enabled destinations.
    pub callbacks: Vec<DestinationKind>,
    /// Flush interval in the extended duration grammar (`30s`, `5m`, `1h30m`, `2d`).
    pub notify_each: Option<String>,
    /// Lifecycle events announced to the destinations.
    pub notify_on: Vec<LifecycleTrigger>,
    pub mode: NotifyMode,
    pub strip_ansi: StripPolicy,
    pub strip_progress: StripPolicy,
    /// Character length above which `auto` mode switches to attachments.
    pub auto_attach_threshold: usize,
    /// Number of lines shown by `summary` mode.
    pub summary_top: usize,
    pub text: TextConfig,
    pub attach: AttachConfig,
    pub filters: FiltersConfig,
    pub redaction: RedactionConfig,
    pub alerts: AlertsConfig,
    pub delivery: DeliveryConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            callbacks: Vec::new(),
            notify_each: None,
            notify_on: Vec::new(),
            mode: NotifyMode::Auto,
            strip_ansi: StripPolicy::Auto,
            strip_progress: StripPolicy::Auto,
            auto_attach_threshold: 3500,
            summary_top: 30,
            text: TextConfig::default(),
            attach: AttachConfig::default(),
            filters: FiltersConfig::default(),
            redaction: RedactionConfig::default(),
            alerts: AlertsConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl NotifyConfig {
    /// The parsed flush interval. `None` when unset or zero.
    pub fn interval(&self) -> Result<Option<Duration>> {
        let Some(raw) = self.notify_each.as_deref() else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        let period = parse_extended_duration(raw)
            .with_context(|| format!("Invalid notify_each value: {}", raw))?;
        Ok((!period.is_zero()).then_some(period))
    }

    pub fn notifies_on(&self, trigger: LifecycleTrigger) -> bool {
        self.notify_on.contains(&trigger)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub select: TextSelect,
    pub head_lines: usize,
    pub tail_lines: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            select: TextSelect::All,
            head_lines: 200,
            tail_lines: 200,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AttachConfig {
    pub enabled: bool,
    pub split_mode: SplitMode,
    pub tail_lines: usize,
    /// Per-destination attachment ceilings in bytes, keyed by destination name.
    pub part_max_bytes: BTreeMap<String, usize>,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            split_mode: SplitMode::Split,
            tail_lines: 5000,
            part_max_bytes: BTreeMap::new(),
        }
    }
}

impl AttachConfig {
    /// Fails on a `part_max_bytes` key that is not a destination name.
    pub fn check_limit_names(&self) -> Result<()> {
        for name in self.part_max_bytes.keys() {
            if !DestinationKind::CONCRETE.iter().any(|kind| kind.as_str() == name) {
                bail!(
                    "Unknown destination '{}' in notify.attach.part_max_bytes (expected one of: discord, slack, telegram, webhook)",
                    name
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct FiltersConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RedactionConfig {
    /// Load the built-in credential patterns.
    pub defaults: bool,
    pub patterns: Vec<String>,
    /// File with one pattern per line.
    pub file: Option<PathBuf>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            defaults: true,
            patterns: Vec::new(),
            file: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlertsConfig {
    pub patterns: Vec<String>,
    pub include_context_lines: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            include_context_lines: 25,
        }
    }
}

/// Queueing and retry settings for the dispatcher.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 5,
            backoff_ms: 500,
            shutdown_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DiscordConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
    pub bot_token: Option<String>,
    pub channel: Option<String>,
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            bot_token: None,
            channel: None,
            api_base: "https://slack.com/api".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    /// `MarkdownV2` escapes text and captions; any other value is passed through unescaped.
    pub parse_mode: String,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            parse_mode: "MarkdownV2".to_string(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            event_output: None,
            output_file: None,
            output_mode: OutputMode::Raw,
            no_color: false,
            tty_output: true,
            transport: TransportConfig::default(),
            notify: NotifyConfig::default(),
            discord: DiscordConfig::default(),
            slack: SlackConfig::default(),
            telegram: TelegramConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// Reads a config file as TOML or YAML depending on its extension.
fn file_figment(path: &Path) -> Result<Figment> {
    if !path.exists() {
        bail!("Config file not found: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let figment = match ext.as_deref() {
        Some("yaml") | Some("yml") => Figment::from(Yaml::file(path)),
        Some("toml") | None => Figment::from(Toml::file(path)),
        Some(other) => bail!("Unsupported config file extension: .{}", other),
    };
    Ok(figment)
}

impl Config {
    /// Builds the layered figment without extracting it.
    pub fn figment(cli: &Cli) -> Result<Figment> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = &cli.config {
            let file = file_figment(path)?;
            figment = figment.merge(file.clone());

            if let Some(profile) = &cli.profile {
                let key = format!("profiles.{}", profile);
                if file.find_value(&key).is_err() {
                    bail!("Profile '{}' not found in {}", profile, path.display());
                }
                figment = figment.merge(file.focus(&key));
            }
        } else if let Some(profile) = &cli.profile {
            bail!("Profile '{}' requested without a config file", profile);
        }

        Ok(figment
            // e.g. RUNWATCH_NOTIFY__MODE=summary
            .merge(Env::prefixed("RUNWATCH_").split("__"))
            .merge(cli.clone()))
    }

    /// Loads the application configuration from every layer.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config: Config = Self::figment(cli)?
            .extract()
            .context("Failed to load configuration")?;
        config.notify.interval()?;
        config.notify.attach.check_limit_names()?;
        Ok(config)
    }
}
