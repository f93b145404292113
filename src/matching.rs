//! Regex gates applied to every sanitized line.
//!
//! [`LineFilter`] decides whether a line is buffered at all, [`AlertMatcher`]
//! decides whether an accepted line triggers an immediate alert.

use crate::config::{AlertsConfig, FiltersConfig};
use anyhow::{Context, Result};
use regex::RegexSet;

fn build_set(patterns: &[String], what: &str) -> Result<Option<RegexSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let set = RegexSet::new(patterns)
        .with_context(|| format!("Invalid {} pattern in {:?}", what, patterns))?;
    Ok(Some(set))
}

/// Include/exclude gate. Exclude wins over include.
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    include: Option<RegexSet>,
    exclude: Option<RegexSet>,
}

impl LineFilter {
    pub fn new(config: &FiltersConfig) -> Result<Self> {
        Ok(Self {
            include: build_set(&config.include, "include")?,
            exclude: build_set(&config.exclude, "exclude")?,
        })
    }

    /// Returns `true` when the line should be buffered.
    ///
    /// With include patterns present a line must match at least one of them;
    /// any exclude match then rejects it.
    pub fn allow(&self, line: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(line) {
                return false;
            }
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(line),
            None => true,
        }
    }
}

/// Detects lines that must be reported right away.
#[derive(Debug, Clone, Default)]
pub struct AlertMatcher {
    patterns: Option<RegexSet>,
    context_lines: usize,
}

impl AlertMatcher {
    pub fn new(config: &AlertsConfig) -> Result<Self> {
        Ok(Self {
            patterns: build_set(&config.patterns, "alert")?,
            context_lines: config.include_context_lines,
        })
    }

    /// Whether any alert pattern is configured.
    pub fn is_enabled(&self) -> bool {
        self.patterns.is_some()
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.patterns
            .as_ref()
            .is_some_and(|set| set.is_match(line))
    }

    /// Size of the sliding context window sent along with an alert.
    pub fn context_lines(&self) -> usize {
        self.context_lines
    }
}
