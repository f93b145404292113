//! Turns the raw byte streams of the monitored process into clean text lines.
//!
//! Two independent transforms are applied to every line before it reaches the
//! notification pipeline: ANSI escape stripping and carriage-return progress
//! stripping. The terminal mirror always receives the untouched bytes.

use crate::core::{LineSink, StreamKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{trace, warn};

// OSC: ESC ] ... (BEL or ST). Must run before the other patterns so that
// escape bytes inside an OSC payload are not matched partially.
static ANSI_OSC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\][^\x07]*?(?:\x07|\x1b\\)").expect("valid OSC regex"));
// CSI: ESC [ parameter bytes, intermediate bytes, final byte
static ANSI_CSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").expect("valid CSI regex"));
// Remaining two-byte escapes
static ANSI_OTHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b[@-Z\\-_]").expect("valid escape regex"));

/// Three-way switch used for both sanitizer modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripPolicy {
    Always,
    Never,
    #[default]
    Auto,
}

impl StripPolicy {
    /// Whether ANSI codes are stripped. `no_color` forces stripping on.
    pub fn strips_ansi(self, no_color: bool) -> bool {
        if no_color {
            return true;
        }
        match self {
            StripPolicy::Always => true,
            StripPolicy::Never | StripPolicy::Auto => false,
        }
    }

    /// Whether carriage-return progress redraws are stripped.
    pub fn strips_progress(self) -> bool {
        match self {
            StripPolicy::Always | StripPolicy::Auto => true,
            StripPolicy::Never => false,
        }
    }
}

/// Removes CSI, OSC and two-byte escape sequences.
pub fn strip_ansi(s: &str) -> String {
    let s = ANSI_OSC.replace_all(s, "");
    let s = ANSI_CSI.replace_all(&s, "");
    ANSI_OTHER.replace_all(&s, "").into_owned()
}

/// Keeps only the text after the last carriage return, modelling a terminal
/// that redraws the same row.
pub fn strip_progress(s: &str) -> &str {
    match s.rfind('\r') {
        Some(idx) => &s[idx + 1..],
        None => s,
    }
}

/// The resolved per-run sanitizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sanitizer {
    pub strip_ansi: bool,
    pub strip_progress: bool,
}

impl Sanitizer {
    pub fn new(ansi: StripPolicy, progress: StripPolicy, no_color: bool) -> Self {
        Self {
            strip_ansi: ansi.strips_ansi(no_color),
            strip_progress: progress.strips_progress(),
        }
    }

    /// Converts one raw line (with or without its terminator) into clean text.
    pub fn sanitize_line(&self, raw: &[u8]) -> String {
        let mut bytes = raw;
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = rest;
        }
        if let Some(rest) = bytes.strip_suffix(b"\r") {
            bytes = rest;
        }

        let text = String::from_utf8_lossy(bytes);
        let text: &str = if self.strip_progress {
            strip_progress(text.as_ref())
        } else {
            text.as_ref()
        };

        if self.strip_ansi {
            strip_ansi(text)
        } else {
            text.to_string()
        }
    }
}

/// Reads `reader` to the end, handing every sanitized line to `sink`.
///
/// When `mirror` is set the original bytes are echoed to it unchanged. A
/// failing mirror is disabled with a warning; a failing read is returned.
pub async fn pump_lines<R, W>(
    reader: R,
    stream: StreamKind,
    sanitizer: Sanitizer,
    mut mirror: Option<W>,
    sink: Arc<dyn LineSink>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(8 * 1024);
    let mut count: u64 = 0;

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }

        if let Some(out) = mirror.as_mut() {
            let echoed = async {
                out.write_all(&buf).await?;
                out.flush().await
            }
            .await;
            if let Err(e) = echoed {
                warn!(%stream, error = %e, "Terminal mirror failed, disabling it");
                mirror = None;
            }
        }

        let line = sanitizer.sanitize_line(&buf);
        sink.on_line(stream, &line);
        count += 1;
    }

    trace!(%stream, lines = count, "Stream reached EOF");
    Ok(())
}
