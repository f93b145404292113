//! The aggregator is a stateful batcher responsible for collecting accepted
//! output lines and turning them into notifications on a timer, at the end of
//! the run, or immediately when an alert pattern matches.

use crate::config::{AttachConfig, NotifyConfig, NotifyMode, SplitMode, TextConfig, TextSelect};
use crate::core::{
    Attachment, FlushReason, LineSink, NotificationBatch, NotificationSink, SendJob, StreamKind,
};
use crate::formatting::{
    build_attachment_parts, head_lines, join_lines, summary, tail_lines, wrap_code_block,
};
use crate::matching::{AlertMatcher, LineFilter};
use crate::redaction::Redactor;
use crate::task_manager::TaskManager;
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const ALERT_TITLE: &str = "ALERT: matched output pattern";

/// The title used for a batch flushed for `reason`.
pub fn batch_title(reason: FlushReason) -> &'static str {
    match reason {
        FlushReason::Tick => "Output batch",
        FlushReason::Final => "Final output",
        FlushReason::Alert => ALERT_TITLE,
    }
}

/// `title`, a newline, then `body` in a code block.
pub fn titled_text(title: &str, body: &str) -> String {
    format!("{}\n{}", title, wrap_code_block(body))
}

fn select_lines<'a>(lines: &'a [String], text: &TextConfig) -> &'a [String] {
    match text.select {
        TextSelect::All => lines,
        TextSelect::Head => head_lines(lines, text.head_lines),
        TextSelect::Tail => tail_lines(lines, text.tail_lines),
    }
}

fn attachments(title: &str, lines: &[String], attach: &AttachConfig, limit: usize) -> Vec<SendJob> {
    match attach.split_mode {
        SplitMode::Tail => {
            let mut data = join_lines(tail_lines(lines, attach.tail_lines)).into_bytes();
            data.push(b'\n');
            vec![SendJob::File(Attachment::text_file("output.log", data, title))]
        }
        SplitMode::Split => {
            let parts = build_attachment_parts(lines, limit);
            let total = parts.len();
            parts
                .into_iter()
                .enumerate()
                .map(|(i, part)| {
                    SendJob::File(Attachment::text_file(
                        format!("output.part.{:03}.log", i + 1),
                        part,
                        format!("{} (part {}/{})", title, i + 1, total),
                    ))
                })
                .collect()
        }
    }
}

/// Decides which messages a flushed batch becomes.
///
/// `attach_limit` is the smallest attachment ceiling across destinations;
/// zero means unlimited.
pub fn plan_delivery(batch: &NotificationBatch, config: &NotifyConfig, attach_limit: usize) -> Vec<SendJob> {
    if batch.lines.is_empty() {
        return Vec::new();
    }
    let text_job = |title: &str, body: &str| SendJob::Text(titled_text(title, body).into());

    if config.mode == NotifyMode::Summary {
        return vec![text_job("Output summary", &summary(&batch.lines, config.summary_top))];
    }

    let title = batch_title(batch.reason);
    let text = join_lines(select_lines(&batch.lines, &config.text));
    let attach = &config.attach;

    match config.mode {
        NotifyMode::TextOnly | NotifyMode::Summary => vec![text_job(title, &text)],
        NotifyMode::AttachOnly if !attach.enabled => {
            vec![SendJob::Text(wrap_code_block(&text).into())]
        }
        NotifyMode::AttachOnly => attachments(title, &batch.lines, attach, attach_limit),
        NotifyMode::Auto => {
            if attach.enabled && text.chars().count() > config.auto_attach_threshold {
                attachments(title, &batch.lines, attach, attach_limit)
            } else {
                vec![text_job(title, &text)]
            }
        }
    }
}

#[derive(Default)]
struct Buffers {
    lines: Vec<String>,
    context: VecDeque<String>,
}

struct Inner {
    config: NotifyConfig,
    filter: LineFilter,
    redactor: Redactor,
    alerts: AlertMatcher,
    sink: Arc<dyn NotificationSink>,
    buffers: Mutex<Buffers>,
}

impl Inner {
    async fn send(&self, job: SendJob) {
        if let Err(e) = self.sink.broadcast(job).await {
            warn!(error = %e, "Could not enqueue notification");
        }
    }

    async fn flush_all(&self, reason: FlushReason) {
        let lines = {
            let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut buffers.lines)
        };
        if lines.is_empty() {
            return;
        }

        debug!(%reason, lines = lines.len(), "Flushing output batch");
        let batch = NotificationBatch { lines, reason };
        for job in plan_delivery(&batch, &self.config, self.sink.attachment_limit()) {
            self.send(job).await;
        }
    }

    async fn send_alert(&self, matched: String, context: Vec<String>) {
        let body = format!("Matched:\n{}\n\nContext:\n{}", matched, join_lines(&context));
        self.send(SendJob::Text(titled_text(ALERT_TITLE, &body).into())).await;
    }
}

/// Buffers accepted lines and flushes them through a [`NotificationSink`].
pub struct Aggregator {
    inner: Arc<Inner>,
    tasks: TaskManager,
    closed: AtomicBool,
}

impl Aggregator {
    /// Creates the aggregator and, when `notify_each` is a positive duration,
    /// starts the periodic flush. Must be called inside a Tokio runtime.
    pub fn new(
        config: NotifyConfig,
        filter: LineFilter,
        redactor: Redactor,
        alerts: AlertMatcher,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        let period = config.interval()?;
        let aggregator = Self {
            inner: Arc::new(Inner {
                config,
                filter,
                redactor,
                alerts,
                sink,
                buffers: Mutex::new(Buffers::default()),
            }),
            tasks: TaskManager::new(),
            closed: AtomicBool::new(false),
        };
        if let Some(period) = period {
            aggregator.start_ticker(period);
        }
        Ok(aggregator)
    }

    /// Builds filter, redactor and alert matcher from `config`.
    pub fn from_config(config: &NotifyConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        let redactor = Redactor::new(&config.redaction)?;
        debug!(patterns = redactor.pattern_count(), "Redaction patterns loaded");
        Self::new(
            config.clone(),
            LineFilter::new(&config.filters)?,
            redactor,
            AlertMatcher::new(&config.alerts)?,
            sink,
        )
    }

    fn start_ticker(&self, period: Duration) {
        let inner = self.inner.clone();
        let mut shutdown_rx = self.tasks.get_shutdown_rx();
        info!(?period, "Periodic notifications enabled");
        // First tick one full period after construction.
        let start = Instant::now() + period;

        self.tasks.spawn("notify-ticker", async move {
            let mut timer = interval_at(start, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        debug!("Notify ticker stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        inner.flush_all(FlushReason::Tick).await;
                    }
                }
            }
        });
    }

    /// Runs one line through filter, redaction, buffering and alert detection.
    pub fn on_line(&self, line: &str) {
        let inner = &self.inner;
        if !inner.filter.allow(line) {
            return;
        }
        let line = inner.redactor.apply(line);
        metrics::counter!("lines_accepted_total").increment(1);

        let alert = {
            let mut buffers = inner.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            buffers.lines.push(line.clone());

            if inner.alerts.is_enabled() {
                let window = inner.alerts.context_lines();
                if window > 0 {
                    buffers.context.push_back(line.clone());
                    while buffers.context.len() > window {
                        buffers.context.pop_front();
                    }
                }
                inner
                    .alerts
                    .is_match(&line)
                    .then(|| buffers.context.iter().cloned().collect::<Vec<_>>())
            } else {
                None
            }
        };

        if let Some(context) = alert {
            metrics::counter!("alerts_triggered_total").increment(1);
            let inner = self.inner.clone();
            self.tasks
                .spawn("alert", async move { inner.send_alert(line, context).await });
        }
    }

    /// Drains the buffer and sends it according to the notify mode. An empty buffer sends nothing.
    pub async fn flush_all(&self, reason: FlushReason) {
        self.inner.flush_all(reason).await;
    }

    /// Announces a lifecycle event, e.g. `send_lifecycle("finished", "make", "exit=0")`.
    /// The message is redacted like any output line.
    pub async fn send_lifecycle(&self, state: &str, command: &str, details: &str) {
        let title = format!("Job {}", state);
        let mut chars = state.chars();
        let capitalized: String = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        let message = self
            .inner
            .redactor
            .apply(&format!("{} `{}`\n{}", capitalized, command, details));
        self.inner
            .send(SendJob::Text(titled_text(&title, &message).into()))
            .await;
    }

    /// Stops the timer and waits for in-flight alert and tick sends. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tasks.signal_shutdown();
        self.tasks.shutdown(None).await;
    }
}

impl LineSink for Aggregator {
    fn on_line(&self, _stream: StreamKind, line: &str) {
        Aggregator::on_line(self, line);
    }
}
