//! Loading exported listening history
//!
//! Each input file holds either a JSON array of events or a single event object. Inputs
//! may be files, directories (every `*.json` inside, sorted by name) or glob patterns.
//! Files are concatenated in argument order; elements are decoded leniently so a bad
//! record never rejects a whole file.

use crate::models::ListeningEvent;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use glob::glob;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Expand inputs into the ordered list of files to read
pub fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        let text = input.to_string_lossy();
        if is_glob_pattern(&text) {
            let mut matched: Vec<PathBuf> = glob(&text)
                .with_context(|| format!("Invalid glob pattern: {text}"))?
                .flatten()
                .filter(|p| p.is_file())
                .collect();
            if matched.is_empty() {
                bail!("No files match {text}");
            }
            matched.sort();
            files.extend(matched);
        } else if input.is_dir() {
            let pattern = input.join("*.json");
            let mut matched: Vec<PathBuf> = glob(&pattern.to_string_lossy())
                .with_context(|| format!("Failed to scan directory: {}", input.display()))?
                .flatten()
                .filter(|p| p.is_file())
                .collect();
            matched.sort();
            debug!(directory = %input.display(), files = matched.len(), "Expanded directory");
            files.extend(matched);
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            bail!("Input not found: {}", input.display());
        }
    }

    Ok(files)
}

fn is_glob_pattern(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

/// Read one file's events
pub fn load_file(path: &Path) -> Result<Vec<ListeningEvent>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_events(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Decode a JSON array of events, or a single event object
pub fn parse_events(content: &str) -> Result<Vec<ListeningEvent>> {
    let value: Value = serde_json::from_str(content).context("Not valid JSON")?;
    match value {
        Value::Array(items) => Ok(items.into_iter().map(ListeningEvent::from_value).collect()),
        object @ Value::Object(_) => Ok(vec![ListeningEvent::from_value(object)]),
        _ => bail!("Expected a JSON array of events or a single event object"),
    }
}

/// Load every input, in order
pub fn load_events(inputs: &[PathBuf]) -> Result<Vec<ListeningEvent>> {
    let files = resolve_inputs(inputs)?;
    if files.is_empty() {
        bail!("No input files found");
    }

    let mut events = Vec::new();
    for file in &files {
        let loaded = load_file(file)?;
        debug!(file = %file.display(), records = loaded.len(), "Loaded file");
        events.extend(loaded);
    }

    info!(files = files.len(), records = events.len(), "Loaded listening history");
    Ok(events)
}

/// Inclusive date range over the UTC date of each event's timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Result<Self> {
        if let (Some(since), Some(until)) = (since, until) {
            if since > until {
                bail!("--since {since} is after --until {until}");
            }
        }
        Ok(Self { since, until })
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// Events without a parseable timestamp are kept
    pub fn contains(&self, event: &ListeningEvent) -> bool {
        let Some(date) = event.timestamp.as_deref().and_then(event_date) else {
            return true;
        };
        self.since.map_or(true, |since| date >= since)
            && self.until.map_or(true, |until| date <= until)
    }

    pub fn apply(&self, events: Vec<ListeningEvent>) -> Vec<ListeningEvent> {
        if self.is_unbounded() {
            return events;
        }
        let before = events.len();
        let kept: Vec<ListeningEvent> = events.into_iter().filter(|e| self.contains(e)).collect();
        debug!(before, after = kept.len(), "Applied date window");
        kept
    }
}

fn event_date(timestamp: &str) -> Option<NaiveDate> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Utc).date_naive());
    }
    timestamp
        .get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// Parse a `YYYY-MM-DD` command-line date
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{text}', expected YYYY-MM-DD"))
}
