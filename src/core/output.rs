//! Rector `--output-format=json` parsing.
//!
//! Rector may print progress or deprecation noise around its JSON document,
//! so the payload is located by brace span before falling back to parsing
//! the whole output.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Aggregate counters reported by Rector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    #[serde(default)]
    pub changed_files: usize,
    #[serde(default)]
    pub errors: usize,
}

/// One changed file with its unified diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub file: String,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub applied_rectors: Vec<String>,
}

/// A processing error reported inside the JSON payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
}

/// Typed view of Rector's JSON output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedOutput {
    pub totals: Totals,
    #[serde(default)]
    pub file_diffs: Vec<FileDiff>,
    #[serde(default)]
    pub errors: Vec<ReportedError>,
}

impl ParsedOutput {
    /// First per-file record; the only one surfaced for single-file runs
    pub fn first_diff(&self) -> Option<&FileDiff> {
        self.file_diffs.first()
    }

    /// Human summary of reported errors, if any were counted
    pub fn error_summary(&self) -> Option<String> {
        if self.totals.errors == 0 {
            return None;
        }

        match self.errors.first() {
            Some(first) => {
                let location = match (&first.file, first.line) {
                    (Some(file), Some(line)) => format!(" ({file}:{line})"),
                    (Some(file), None) => format!(" ({file})"),
                    _ => String::new(),
                };
                Some(format!(
                    "Rector reported {} error(s): {}{}",
                    self.totals.errors, first.message, location
                ))
            }
            None => Some(format!("Rector reported {} error(s)", self.totals.errors)),
        }
    }
}

/// Parse raw stdout; `None` means no valid JSON under either strategy.
pub fn parse(raw: &str) -> Option<ParsedOutput> {
    if let Some(span) = outer_brace_span(raw) {
        match serde_json::from_str::<ParsedOutput>(span) {
            Ok(parsed) => return Some(parsed),
            Err(e) => debug!(error = %e, "brace span did not parse, trying whole output"),
        }
    }

    match serde_json::from_str::<ParsedOutput>(raw.trim()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(error = %e, bytes = raw.len(), "output is not rector json");
            None
        }
    }
}

/// Greedy span from the first `{` to the last `}`.
fn outer_brace_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
