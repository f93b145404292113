//! The main application logic, decoupled from the entry point.

use crate::{
    config::{Config, LifecycleTrigger},
    core::{Destination, FlushReason, LineSink, StreamKind},
    events::EventSink,
    notification::{build_destinations, http::build_client, Aggregator, Dispatcher},
    outputs::OutputFile,
    runner::{run_command, CommandPlan},
    sanitize::Sanitizer,
};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Hands every line to each downstream sink in turn.
struct FanOut(Vec<Arc<dyn LineSink>>);

impl LineSink for FanOut {
    fn on_line(&self, stream: StreamKind, line: &str) {
        for sink in &self.0 {
            sink.on_line(stream, line);
        }
    }
}

/// Dispatcher and aggregator, present only when a destination is enabled.
struct Notifier {
    dispatcher: Arc<Dispatcher>,
    aggregator: Arc<Aggregator>,
}

/// A configured run of one monitored command.
pub struct App {
    config: Config,
    sanitizer: Sanitizer,
    invocation: Option<String>,
    destinations_override: Option<Vec<Arc<dyn Destination>>>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    fn build_notifier(&mut self) -> Result<Option<Notifier>> {
        let destinations = match self.destinations_override.take() {
            Some(destinations) => destinations,
            None if self.config.notify.callbacks.is_empty() => Vec::new(),
            None => {
                let http = build_client(&self.config.transport)?;
                build_destinations(&self.config, &http)?
            }
        };
        if destinations.is_empty() {
            info!("No notification destinations enabled");
            return Ok(None);
        }

        let dispatcher = Arc::new(Dispatcher::new(destinations, &self.config.notify.delivery));
        let aggregator = Aggregator::from_config(&self.config.notify, dispatcher.clone())
            .context("Invalid notification settings")?;
        Ok(Some(Notifier {
            dispatcher,
            aggregator: Arc::new(aggregator),
        }))
    }

    /// Runs `plan` to completion and returns the child's exit code.
    ///
    /// Configuration problems fail before the child is spawned. Pending
    /// notifications are drained before this returns.
    #[instrument(skip_all, fields(command = %plan.describe()))]
    pub async fn run(mut self, plan: &CommandPlan) -> Result<i32> {
        let description = plan.describe();
        let invocation = self.invocation.take().unwrap_or_else(|| description.clone());

        let output = self
            .config
            .output_file
            .as_deref()
            .map(|path| OutputFile::create(path, self.config.output_mode))
            .transpose()?
            .map(Arc::new);
        let notifier = self.build_notifier()?;
        let events = Arc::new(EventSink::open(self.config.event_output.as_deref()));

        let mut sinks: Vec<Arc<dyn LineSink>> = vec![events.clone() as Arc<dyn LineSink>];
        if let Some(output) = &output {
            sinks.push(output.clone());
        }
        if let Some(notifier) = &notifier {
            sinks.push(notifier.aggregator.clone());
        }

        events.lifecycle("started", &invocation, BTreeMap::new());
        if let Some(notifier) = &notifier {
            if self.config.notify.notifies_on(LifecycleTrigger::Start) {
                notifier
                    .aggregator
                    .send_lifecycle("started", &invocation, &description)
                    .await;
            }
        }

        let result = run_command(
            plan,
            self.sanitizer,
            self.config.tty_output,
            Arc::new(FanOut(sinks)),
        )
        .await;
        let exit_code = match &result {
            Ok(outcome) => outcome.exit_code,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Command failed to run");
                1
            }
        };
        info!(exit_code, "Command finished");

        if let Some(notifier) = &notifier {
            notifier.aggregator.flush_all(FlushReason::Final).await;
            if self.config.notify.notifies_on(LifecycleTrigger::Finish) {
                let details = format!("{} | exit={}", description, exit_code);
                notifier
                    .aggregator
                    .send_lifecycle("finished", &invocation, &details)
                    .await;
            }
            notifier.aggregator.close().await;
            notifier.dispatcher.close().await;
        }

        if let Some(output) = &output {
            if let Err(e) = output.finish() {
                warn!(path = %output.path().display(), error = %format!("{:#}", e), "Failed to finish output file");
            }
        }
        events.lifecycle(
            "finished",
            &invocation,
            BTreeMap::from([("exit_code", exit_code.to_string())]),
        );

        result.map(|outcome| outcome.exit_code)
    }
}

/// Builder for the application.
///
/// Separates construction from running and lets tests swap the destination
/// clients for in-process fakes.
pub struct AppBuilder {
    config: Config,
    sanitizer: Option<Sanitizer>,
    invocation: Option<String>,
    destinations_override: Option<Vec<Arc<dyn Destination>>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sanitizer: None,
            invocation: None,
            destinations_override: None,
        }
    }

    /// Overrides the sanitizer derived from the strip settings.
    pub fn sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// The full command line shown in lifecycle messages. Defaults to the child command.
    pub fn invocation(mut self, invocation: impl Into<String>) -> Self {
        self.invocation = Some(invocation.into());
        self
    }

    /// Overrides the destination clients for testing.
    pub fn destinations_override(mut self, destinations: Vec<Arc<dyn Destination>>) -> Self {
        self.destinations_override = Some(destinations);
        self
    }

    pub fn build(self) -> App {
        let notify = &self.config.notify;
        let sanitizer = self.sanitizer.unwrap_or_else(|| {
            Sanitizer::new(notify.strip_ansi, notify.strip_progress, self.config.no_color)
        });
        App {
            config: self.config,
            sanitizer,
            invocation: self.invocation,
            destinations_override: self.destinations_override,
        }
    }
}
