//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. Flags that mirror configuration keys are merged as the last
//! figment layer, over the config file and the environment.

use crate::redaction::REDACTION_MARKER;
use crate::runner::CommandPlan;
use anyhow::{bail, Result};
use clap::Parser;
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Runs a command and reports its output to chat and webhook destinations.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
#[command(override_usage = "runwatch [OPTIONS] -- <CMD> [ARGS]...\n       runwatch [OPTIONS] --command <STRING>")]
pub struct Cli {
    /// Path to a TOML or YAML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Named profile from the configuration file, merged over its base settings.
    #[arg(long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Command string run through `sh -c`.
    #[arg(long, value_name = "STRING", conflicts_with = "argv")]
    pub command: Option<String>,

    /// Working directory of the child process.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the child process.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Destinations to notify (discord, slack, telegram, webhook, all).
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub callbacks: Vec<String>,

    /// Flush interval, e.g. `30s`, `5m`, `1h30m`, `2d`.
    #[arg(long, value_name = "DURATION")]
    pub notify_each: Option<String>,

    /// Lifecycle events to announce (start, finish).
    #[arg(long, value_name = "LIST", value_delimiter = ',')]
    pub notify_on: Vec<String>,

    /// text-only, attach-only, auto or summary.
    #[arg(long, value_name = "MODE")]
    pub notify_mode: Option<String>,

    /// Lines used for text messages (all, head, tail).
    #[arg(long, value_name = "SELECT")]
    pub text_select: Option<String>,

    #[arg(long, value_name = "N")]
    pub text_head_lines: Option<usize>,

    #[arg(long, value_name = "N")]
    pub text_tail_lines: Option<usize>,

    /// Character length above which `auto` mode sends an attachment.
    #[arg(long, value_name = "CHARS")]
    pub auto_attach_threshold: Option<usize>,

    #[arg(long, value_name = "N")]
    pub summary_top: Option<usize>,

    /// Never send attachments.
    #[arg(long)]
    pub no_attach: bool,

    /// split or tail.
    #[arg(long, value_name = "MODE")]
    pub attach_split_mode: Option<String>,

    #[arg(long, value_name = "N")]
    pub attach_tail_lines: Option<usize>,

    /// Per-destination attachment ceilings, e.g. `discord=8000000,slack=1000000`.
    #[arg(long, value_name = "NAME=BYTES", value_delimiter = ',', value_parser = parse_key_bytes)]
    pub attach_max_bytes: Vec<(String, usize)>,

    /// Only lines matching one of these patterns are reported.
    #[arg(long, value_name = "REGEX")]
    pub include: Vec<String>,

    /// Lines matching any of these patterns are never reported.
    #[arg(long, value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Additional redaction pattern.
    #[arg(long, value_name = "REGEX")]
    pub redact: Vec<String>,

    /// File with one redaction pattern per line.
    #[arg(long, value_name = "FILE")]
    pub redact_file: Option<PathBuf>,

    /// Disable the built-in credential patterns.
    #[arg(long)]
    pub no_default_redaction: bool,

    /// Pattern that triggers an immediate alert.
    #[arg(long, value_name = "REGEX")]
    pub alert: Vec<String>,

    /// Lines of context sent with an alert.
    #[arg(long, value_name = "N")]
    pub alert_context: Option<usize>,

    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    #[arg(long, value_name = "USER:PASS")]
    pub proxy_auth: Option<String>,

    #[arg(long, value_name = "HOSTS")]
    pub no_proxy: Option<String>,

    /// Do not pick up proxies from the HTTP(S)_PROXY environment variables.
    #[arg(long)]
    pub ignore_env_proxy: bool,

    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,

    #[arg(long, value_name = "SECONDS")]
    pub timeout_secs: Option<u64>,

    #[arg(long, value_name = "URL")]
    pub discord_webhook: Option<String>,

    #[arg(long, value_name = "URL")]
    pub slack_webhook: Option<String>,

    #[arg(long, value_name = "TOKEN")]
    pub slack_token: Option<String>,

    #[arg(long, value_name = "CHANNEL")]
    pub slack_channel: Option<String>,

    #[arg(long, value_name = "TOKEN")]
    pub telegram_token: Option<String>,

    #[arg(long, value_name = "ID")]
    pub telegram_chat_id: Option<String>,

    #[arg(long, value_name = "MODE")]
    pub telegram_parse_mode: Option<String>,

    #[arg(long, value_name = "URL")]
    pub webhook_url: Option<String>,

    /// Header added to every generic webhook request.
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub webhook_header: Vec<(String, String)>,

    /// Write JSON-lines events to this file.
    #[arg(long, value_name = "FILE")]
    pub event_output: Option<PathBuf>,

    /// Record sanitized output lines to this file.
    #[arg(short, long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,

    /// raw or sort-dedup.
    #[arg(long, value_name = "MODE")]
    pub output_mode: Option<String>,

    /// always, never or auto.
    #[arg(long, value_name = "POLICY")]
    pub strip_ansi: Option<String>,

    /// always, never or auto.
    #[arg(long, value_name = "POLICY")]
    pub strip_progress: Option<String>,

    /// Strip ANSI codes from reported lines.
    #[arg(long)]
    pub no_color: bool,

    /// Do not echo the child's output to the terminal.
    #[arg(long)]
    pub no_tty_output: bool,

    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// The command to run and its arguments.
    #[arg(last = true, value_name = "CMD")]
    pub argv: Vec<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn parse_key_bytes(s: &str) -> Result<(String, usize), String> {
    let (key, value) = parse_key_value(s)?;
    let bytes = value
        .trim()
        .parse::<usize>()
        .map_err(|e| format!("invalid byte count in '{}': {}", s, e))?;
    Ok((key.to_lowercase(), bytes))
}

/// Inserts `value` at a dotted `path`, creating nested dictionaries as needed.
fn insert_path(dict: &mut Dict, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            dict.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = dict
                .entry(head.to_string())
                .or_insert_with(|| Value::Dict(Tag::Default, Dict::new()));
            if let Value::Dict(_, inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn path_value(path: &std::path::Path) -> Value {
    Value::from(path.to_string_lossy().into_owned())
}

impl Cli {
    /// Resolves the child command from `--command` or the trailing arguments.
    pub fn command_plan(&self) -> Result<CommandPlan> {
        let mut plan = match (&self.command, self.argv.split_first()) {
            (Some(command), _) => CommandPlan::shell(command),
            (None, Some((program, args))) => CommandPlan::new(program, args.to_vec()),
            (None, None) => bail!("No command given. Use `-- <cmd> [args]` or `--command <string>`"),
        };
        plan.cwd = self.cwd.clone();
        plan.env = self.env.clone();
        Ok(plan)
    }
}

/// Flags whose values are, or may embed, credentials.
const SECRET_FLAGS: &[&str] = &[
    "--discord-webhook",
    "--slack-webhook",
    "--slack-token",
    "--telegram-token",
    "--webhook-url",
    "--webhook-header",
    "--proxy",
    "--proxy-auth",
];

/// Joins `args` for display with the values of credential flags masked.
///
/// Arguments after `--` belong to the child command and are kept.
pub fn display_invocation<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    let mut mask_next = false;
    let mut child = false;
    for arg in args {
        let arg = arg.as_ref();
        if child {
            out.push(arg.to_string());
        } else if mask_next {
            out.push(REDACTION_MARKER.to_string());
            mask_next = false;
        } else if arg == "--" {
            child = true;
            out.push(arg.to_string());
        } else {
            match arg.split_once('=') {
                Some((flag, _)) if SECRET_FLAGS.contains(&flag) => {
                    out.push(format!("{}={}", flag, REDACTION_MARKER));
                }
                _ => {
                    mask_next = SECRET_FLAGS.contains(&arg);
                    out.push(arg.to_string());
                }
            }
        }
    }
    out.join(" ")
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        let strings = [
            ("log_level", &self.log_level),
            ("output_mode", &self.output_mode),
            ("notify.notify_each", &self.notify_each),
            ("notify.mode", &self.notify_mode),
            ("notify.strip_ansi", &self.strip_ansi),
            ("notify.strip_progress", &self.strip_progress),
            ("notify.text.select", &self.text_select),
            ("notify.attach.split_mode", &self.attach_split_mode),
            ("transport.proxy", &self.proxy),
            ("transport.proxy_auth", &self.proxy_auth),
            ("transport.no_proxy", &self.no_proxy),
            ("discord.webhook_url", &self.discord_webhook),
            ("slack.webhook_url", &self.slack_webhook),
            ("slack.bot_token", &self.slack_token),
            ("slack.channel", &self.slack_channel),
            ("telegram.bot_token", &self.telegram_token),
            ("telegram.chat_id", &self.telegram_chat_id),
            ("telegram.parse_mode", &self.telegram_parse_mode),
            ("webhook.url", &self.webhook_url),
        ];
        for (path, value) in strings {
            if let Some(value) = value {
                insert_path(&mut dict, path, Value::from(value.clone()));
            }
        }

        let counts = [
            ("notify.text.head_lines", self.text_head_lines),
            ("notify.text.tail_lines", self.text_tail_lines),
            ("notify.auto_attach_threshold", self.auto_attach_threshold),
            ("notify.summary_top", self.summary_top),
            ("notify.attach.tail_lines", self.attach_tail_lines),
            ("notify.alerts.include_context_lines", self.alert_context),
        ];
        for (path, value) in counts {
            if let Some(value) = value {
                insert_path(&mut dict, path, Value::from(value));
            }
        }
        if let Some(timeout) = self.timeout_secs {
            insert_path(&mut dict, "transport.timeout_secs", Value::from(timeout));
        }

        let lists = [
            ("notify.callbacks", &self.callbacks),
            ("notify.notify_on", &self.notify_on),
            ("notify.filters.include", &self.include),
            ("notify.filters.exclude", &self.exclude),
            ("notify.redaction.patterns", &self.redact),
            ("notify.alerts.patterns", &self.alert),
        ];
        for (path, values) in lists {
            if !values.is_empty() {
                insert_path(&mut dict, path, Value::from(values.clone()));
            }
        }

        if let Some(path) = &self.redact_file {
            insert_path(&mut dict, "notify.redaction.file", path_value(path));
        }
        if let Some(path) = &self.event_output {
            insert_path(&mut dict, "event_output", path_value(path));
        }
        if let Some(path) = &self.output_file {
            insert_path(&mut dict, "output_file", path_value(path));
        }

        // Boolean switches only ever override in one direction.
        if self.no_attach {
            insert_path(&mut dict, "notify.attach.enabled", Value::from(false));
        }
        if self.no_default_redaction {
            insert_path(&mut dict, "notify.redaction.defaults", Value::from(false));
        }
        if self.insecure {
            insert_path(&mut dict, "transport.insecure", Value::from(true));
        }
        if self.ignore_env_proxy {
            insert_path(&mut dict, "transport.ignore_env_proxy", Value::from(true));
        }
        if self.no_color {
            insert_path(&mut dict, "no_color", Value::from(true));
        }
        if self.no_tty_output {
            insert_path(&mut dict, "tty_output", Value::from(false));
        }

        if !self.attach_max_bytes.is_empty() {
            let limits: Dict = self
                .attach_max_bytes
                .iter()
                .map(|(name, bytes)| (name.clone(), Value::from(*bytes)))
                .collect();
            insert_path(
                &mut dict,
                "notify.attach.part_max_bytes",
                Value::Dict(Tag::Default, limits),
            );
        }
        if !self.webhook_header.is_empty() {
            let headers: Dict = self
                .webhook_header
                .iter()
                .map(|(key, value)| (key.clone(), Value::from(value.clone())))
                .collect();
            insert_path(&mut dict, "webhook.headers", Value::Dict(Tag::Default, headers));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
