//! The optional local output file.
//!
//! In `raw` mode every sanitized line is appended as it arrives. In
//! `sort-dedup` mode the distinct lines are collected and written, sorted,
//! when the run ends.

use crate::config::OutputMode;
use crate::core::{LineSink, StreamKind};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

enum State {
    Raw(Option<BufWriter<File>>),
    SortDedup(BTreeSet<String>),
    Finished,
}

pub struct OutputFile {
    path: PathBuf,
    state: Mutex<State>,
}

impl OutputFile {
    /// Creates (truncating) the file at `path`. Failing to create it is fatal.
    pub fn create(path: &Path, mode: OutputMode) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))?;
        let state = match mode {
            OutputMode::Raw => State::Raw(Some(BufWriter::new(file))),
            OutputMode::SortDedup => {
                drop(file);
                State::SortDedup(BTreeSet::new())
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered lines, or writes the collected set in `sort-dedup` mode.
    pub fn finish(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, State::Finished) {
            State::Raw(Some(mut writer)) => writer
                .flush()
                .with_context(|| format!("Failed to flush {}", self.path.display()))?,
            State::SortDedup(lines) => {
                let mut writer = BufWriter::new(
                    File::create(&self.path)
                        .with_context(|| format!("Failed to reopen {}", self.path.display()))?,
                );
                for line in &lines {
                    writeln!(writer, "{}", line)?;
                }
                writer.flush()?;
                debug!(path = %self.path.display(), lines = lines.len(), "Wrote sorted output");
            }
            State::Raw(None) | State::Finished => {}
        }
        Ok(())
    }
}

impl LineSink for OutputFile {
    fn on_line(&self, _stream: StreamKind, line: &str) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            State::Raw(slot) => {
                if let Some(writer) = slot {
                    if let Err(e) = writeln!(writer, "{}", line) {
                        warn!(path = %self.path.display(), error = %e, "Output file disabled after write error");
                        *slot = None;
                    }
                }
            }
            State::SortDedup(lines) => {
                if !lines.contains(line) {
                    lines.insert(line.to_string());
                }
            }
            State::Finished => {}
        }
    }
}
