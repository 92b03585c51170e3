//! Stream event interpretation: classify `event:` / `data:` lines from the
//! query stream and fold them into an in-progress answer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A retrieved source passage attached to an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub content: String,
}

/// Latency breakdown for one completed query, keyed by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_ms: Option<f64>,
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
}

impl TimingSummary {
    /// Total to display: the reported total, or the breakdown sum rounded to
    /// 2 decimal places when no total was reported. The derived value is a
    /// display fallback only and is never written back to `total_ms`.
    pub fn display_total_ms(&self) -> Option<f64> {
        if self.total_ms.is_some() {
            return self.total_ms;
        }
        if self.breakdown.is_empty() {
            return None;
        }
        let sum: f64 = self.breakdown.values().sum();
        Some((sum * 100.0).round() / 100.0)
    }
}

/// One `data:` payload. All fields are optional; classification is independent
/// per record (a citation record carries both `source` and `content`).
#[derive(Debug, Clone, Deserialize)]
struct DataRecord {
    content: Option<String>,
    source: Option<String>,
    total_ms: Option<f64>,
    #[serde(default)]
    breakdown: BTreeMap<String, f64>,
    error: Option<String>,
}

/// Incremental notification surfaced to observers while a stream is open.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// Answer text accumulated so far.
    Content(String),
    /// Terminal error text; replaces the visible answer.
    Error(String),
}

/// Everything reconstructed from one stream once it has drained.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutcome {
    /// Final answer text, or the error-prefixed text if the stream errored.
    pub content: String,
    pub citations: Vec<Citation>,
    pub timing: Option<TimingSummary>,
    pub errored: bool,
}

/// Folds decoded lines into answer text, citations, and timing.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    citations: Vec<Citation>,
    timing: Option<TimingSummary>,
    error: Option<String>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one line. Prefixes are matched on the raw line, so blank or
    /// indented lines are inert. `event:` lines are informational only.
    /// `data:` lines carry a JSON record; records that fail to parse are
    /// dropped silently (best effort under arbitrary fragmentation),
    /// everything else is folded in arrival order. Returns the update to
    /// surface, if any.
    pub fn feed_line(&mut self, line: &str) -> Option<StreamUpdate> {
        if line.starts_with("event:") {
            return None;
        }
        let payload = line.strip_prefix("data:")?;
        let record: DataRecord = match serde_json::from_str(payload.trim()) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!("dropping unparseable data record: {}", err);
                return None;
            }
        };

        let mut update = None;
        if let Some(token) = &record.content {
            self.content.push_str(token);
            if self.error.is_none() {
                update = Some(StreamUpdate::Content(self.content.clone()));
            }
        }
        if let Some(source) = record.source {
            self.citations.push(Citation {
                source,
                content: record.content.unwrap_or_default(),
            });
        }
        if record.total_ms.is_some() || !record.breakdown.is_empty() {
            // Last timing record wins; only one is expected per stream.
            self.timing = Some(TimingSummary {
                total_ms: record.total_ms,
                breakdown: record.breakdown,
            });
        }
        if let Some(message) = record.error {
            let text = format!("Error: {}", message);
            self.error = Some(text.clone());
            update = Some(StreamUpdate::Error(text));
        }
        update
    }

    /// Finalize once the stream has drained.
    pub fn finish(self) -> StreamOutcome {
        let errored = self.error.is_some();
        StreamOutcome {
            content: self.error.unwrap_or(self.content),
            citations: self.citations,
            timing: self.timing,
            errored,
        }
    }
}
