//! Running statistics and the capped sample table.
//!
//! Counters only ever grow. The sample table stops accepting rows at
//! [`MAX_TABLE_ROWS`], while the `matches` counter keeps counting.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::report::{flush_best_effort, ImagePayload, ReportSink};
use crate::types::MatchResult;

/// Hard cap on prediction table rows.
pub const MAX_TABLE_ROWS: usize = 200_000;

pub const TOTAL_IMGS: &str = "total_imgs";
pub const NUM_CANDIDATES_SCORED: &str = "num_candidates_scored";
pub const MATCHES: &str = "matches";
pub const INFERENCE_TIME: &str = "inference_time";
pub const NO_CANDIDATES: &str = "no_candidates";
pub const SKIPPED_SAMPLES: &str = "skipped_samples";

/// One row of the derived stats table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    pub description: String,
    /// `count / total_imgs`, or 0 before any sample was seen
    pub fraction: f64,
    pub count: f64,
}

impl StatsRow {
    pub fn new(description: impl Into<String>, fraction: f64, count: f64) -> Self {
        Self {
            description: description.into(),
            fraction,
            count,
        }
    }
}

/// One row of the prediction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    /// Dataset key of the sample
    pub key: String,
    pub image: Option<ImagePayload>,
    /// Winning candidate
    pub text: String,
    pub score: f32,
}

/// Named monotonic counters plus cumulative inference time.
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    counters: BTreeMap<String, u64>,
    inference_time: Duration,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&mut self, name: &str, n: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += n;
    }

    /// Current value of a counter; unknown counters read as 0.
    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn add_inference_time(&mut self, elapsed: Duration) {
        self.inference_time += elapsed;
    }

    pub fn inference_time(&self) -> Duration {
        self.inference_time
    }

    pub fn total_imgs(&self) -> u64 {
        self.get(TOTAL_IMGS)
    }

    pub fn matches(&self) -> u64 {
        self.get(MATCHES)
    }

    /// Derive `(name, count / total_imgs, count)` for every counter, followed
    /// by the inference time in seconds.
    pub fn rows(&self) -> Vec<StatsRow> {
        let total = self.total_imgs() as f64;
        let fraction = |count: f64| if total > 0.0 { count / total } else { 0.0 };

        let mut rows: Vec<StatsRow> = self
            .counters
            .iter()
            .map(|(name, &count)| StatsRow::new(name.clone(), fraction(count as f64), count as f64))
            .collect();

        let seconds = self.inference_time.as_secs_f64();
        rows.push(StatsRow::new(INFERENCE_TIME, fraction(seconds), seconds));
        rows
    }
}

/// Append-only prediction table with a row cap.
#[derive(Debug, Clone)]
pub struct SampleTable {
    rows: Vec<PredictionRow>,
    cap: usize,
}

impl Default for SampleTable {
    fn default() -> Self {
        Self::with_cap(MAX_TABLE_ROWS)
    }
}

impl SampleTable {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            rows: Vec::new(),
            cap,
        }
    }

    /// Append a row. Returns `false` once the table is full.
    pub fn push(&mut self, row: PredictionRow) -> bool {
        if self.is_full() {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.cap
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[PredictionRow] {
        &self.rows
    }
}

/// Best match of a sample that had candidates.
#[derive(Debug, Clone)]
pub struct ScoredMatch {
    pub result: MatchResult,
    /// Wall time of text + image encoding and scoring
    pub elapsed: Duration,
}

/// What the driver learned about one sample.
#[derive(Debug, Clone, Default)]
pub struct SampleOutcome {
    pub key: String,
    /// Language detected for the "before" span
    pub before_language: Option<String>,
    /// Language detected for the "after" span
    pub after_language: Option<String>,
    /// `None` when the caption produced no candidates
    pub scored: Option<ScoredMatch>,
}

/// Folds sample outcomes into running stats and the sample table, and
/// decides when the tables are flushed.
pub struct Aggregator {
    stats: RunningStats,
    table: SampleTable,
    threshold: f32,
    flush_interval: usize,
    warned_full: bool,
}

impl Aggregator {
    pub fn new(threshold: f32, flush_interval: usize) -> Self {
        Self::with_table(threshold, flush_interval, SampleTable::default())
    }

    pub fn with_table(threshold: f32, flush_interval: usize, table: SampleTable) -> Self {
        Self {
            stats: RunningStats::new(),
            table,
            threshold,
            flush_interval: flush_interval.max(1),
            warned_full: false,
        }
    }

    /// Record one sample. `preview` is only called for accepted matches that
    /// still fit in the table.
    ///
    /// Returns `true` when a row was appended and the table reached a
    /// multiple of the flush interval.
    pub fn record<F>(&mut self, outcome: SampleOutcome, preview: F) -> bool
    where
        F: FnOnce() -> Option<ImagePayload>,
    {
        self.stats.increment(TOTAL_IMGS);
        if let Some(lang) = &outcome.before_language {
            self.stats.increment(&format!("before_{lang}"));
        }
        if let Some(lang) = &outcome.after_language {
            self.stats.increment(&format!("after_{lang}"));
        }

        let Some(scored) = outcome.scored else {
            self.stats.increment(NO_CANDIDATES);
            return false;
        };

        self.stats.increment(NUM_CANDIDATES_SCORED);
        self.stats.add_inference_time(scored.elapsed);

        if scored.result.score < self.threshold {
            return false;
        }
        self.stats.increment(MATCHES);

        if self.table.is_full() {
            if !self.warned_full {
                tracing::warn!(
                    "Prediction table reached {} rows; further matches are counted but not stored",
                    self.table.len()
                );
                self.warned_full = true;
            }
            return false;
        }

        self.table.push(PredictionRow {
            key: outcome.key,
            image: preview(),
            text: scored.result.candidate,
            score: scored.result.score,
        });
        self.table.len() % self.flush_interval == 0
    }

    /// Count a sample skipped because of a recoverable data error.
    pub fn record_skipped(&mut self) {
        self.stats.increment(TOTAL_IMGS);
        self.stats.increment(SKIPPED_SAMPLES);
    }

    /// Push the current table snapshot and stats to `sink`. Never resets state.
    pub fn flush(&self, sink: &mut dyn ReportSink) {
        flush_best_effort(sink, self.table.rows(), &self.stats.rows());
    }

    pub fn stats(&self) -> &RunningStats {
        &self.stats
    }

    pub fn table(&self) -> &SampleTable {
        &self.table
    }
}
