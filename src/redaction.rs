//! Masks secrets in lines before they can reach the network.

use crate::config::RedactionConfig;
use anyhow::{Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;

/// The marker that replaces every redacted match.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Built-in patterns for common credential shapes.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)(api[_-]?key|token|secret|password|passwd|pwd)=\S+",
    r"(?i)(authorization:\s*bearer)\s+\S+",
    r"(?i)(x-api-key:)\s*\S+",
    r"(?i)(client_secret)\s*[:=]\s*\S+",
];

/// An ordered list of redaction patterns.
///
/// Patterns run in registration order and each one sees the output of the
/// previous one, so a secret partially masked by an earlier pattern may no
/// longer match a later one.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Vec<Regex>,
}

impl Redactor {
    /// Builds a redactor from defaults, inline patterns and an optional pattern file.
    pub fn new(config: &RedactionConfig) -> Result<Self> {
        let mut redactor = Self::default();
        if config.defaults {
            for pattern in DEFAULT_PATTERNS {
                redactor.push(pattern)?;
            }
        }
        for pattern in &config.patterns {
            redactor.push(pattern)?;
        }
        if let Some(path) = &config.file {
            redactor.load_file(path)?;
        }
        Ok(redactor)
    }

    fn push(&mut self, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid redaction pattern: {}", pattern))?;
        self.rules.push(regex);
        Ok(())
    }

    /// Appends patterns from a file, one per line. Blank lines and `#` comments are skipped.
    fn load_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read redaction file: {}", path.display()))?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.push(line)?;
        }
        Ok(())
    }

    /// Returns the number of loaded patterns.
    pub fn pattern_count(&self) -> usize {
        self.rules.len()
    }

    pub fn apply(&self, line: &str) -> String {
        let mut out = line.to_string();
        for rule in &self.rules {
            if rule.is_match(&out) {
                out = rule.replace_all(&out, REDACTION_MARKER).into_owned();
            }
        }
        out
    }
}
