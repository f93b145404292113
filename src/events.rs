//! JSON-lines event log.
//!
//! Best effort: a file that cannot be opened disables the sink with a
//! warning, and a failed write only warns.

use crate::core::{LineSink, StreamKind};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// One record of the event log.
#[derive(Debug, Serialize)]
pub struct Event<'a> {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKind>,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<&'a str, String>,
}

impl<'a> Event<'a> {
    fn now(kind: &'a str, message: &'a str) -> Self {
        Self {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            kind,
            stream: None,
            message,
            command: None,
            fields: BTreeMap::new(),
        }
    }
}

#[derive(Default)]
pub struct EventSink {
    writer: Option<Mutex<BufWriter<File>>>,
}

impl EventSink {
    /// Opens `path` for appending. `None` or an open failure yields a disabled sink.
    pub fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                writer: Some(Mutex::new(BufWriter::new(file))),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Event output disabled");
                Self::default()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Records a lifecycle transition such as `started` or `finished`.
    pub fn lifecycle(&self, state: &str, command: &str, fields: BTreeMap<&str, String>) {
        let mut event = Event::now("lifecycle", state);
        event.command = Some(command);
        event.fields = fields;
        self.write(&event);
    }

    pub fn write(&self, event: &Event<'_>) {
        let Some(writer) = &self.writer else {
            return;
        };
        let mut writer = writer.lock().unwrap_or_else(PoisonError::into_inner);
        let result = serde_json::to_writer(&mut *writer, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write event");
        }
    }
}

impl LineSink for EventSink {
    fn on_line(&self, stream: StreamKind, line: &str) {
        if self.writer.is_none() {
            return;
        }
        let mut event = Event::now("line", line);
        event.stream = Some(stream);
        self.write(&event);
    }
}
