//! Reporting sinks for the prediction and stats tables.
//!
//! Flushes are best-effort: a failing sink is logged and ignored, and the
//! run continues with its counters untouched.

pub mod json;
pub mod preview;
pub mod writer;

pub use json::JsonReportSink;
pub use preview::{ImagePayload, PreviewGenerator};

use crate::config::Config;
use crate::error::Result;
use crate::stats::{PredictionRow, StatsRow};

/// Column headers of the prediction table.
pub const PREDICTION_COLUMNS: [&str; 3] = ["Image", "Predicted text", "Score"];

/// Column headers of the stats table.
pub const STATS_COLUMNS: [&str; 3] = ["Description", "Fraction", "Counts"];

/// Destination for periodic table snapshots.
pub trait ReportSink: Send {
    /// Record the configuration of the run, once before any table.
    fn log_config(&mut self, config: &Config) -> Result<()>;

    /// Receive the full prediction table as it stands.
    fn log_predictions(&mut self, rows: &[PredictionRow]) -> Result<()>;

    /// Receive the derived stats table.
    fn log_stats(&mut self, rows: &[StatsRow]) -> Result<()>;
}

/// Sink used when reporting is disabled.
#[derive(Debug, Default)]
pub struct NoopSink;

impl ReportSink for NoopSink {
    fn log_config(&mut self, _config: &Config) -> Result<()> {
        Ok(())
    }

    fn log_predictions(&mut self, _rows: &[PredictionRow]) -> Result<()> {
        Ok(())
    }

    fn log_stats(&mut self, _rows: &[StatsRow]) -> Result<()> {
        Ok(())
    }
}

/// Push both tables to `sink`, logging instead of propagating failures.
pub fn flush_best_effort(
    sink: &mut dyn ReportSink,
    predictions: &[PredictionRow],
    stats: &[StatsRow],
) {
    if let Err(e) = sink.log_predictions(predictions) {
        tracing::warn!("Failed to flush prediction table ({} rows): {e}", predictions.len());
    }
    if let Err(e) = sink.log_stats(stats) {
        tracing::warn!("Failed to flush stats table: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PairsiftError;

    struct FailingSink {
        attempts: usize,
    }

    impl ReportSink for FailingSink {
        fn log_config(&mut self, _config: &Config) -> Result<()> {
            Err(PairsiftError::Io(std::io::Error::other("dashboard offline")))
        }

        fn log_predictions(&mut self, _rows: &[PredictionRow]) -> Result<()> {
            self.attempts += 1;
            Err(PairsiftError::Io(std::io::Error::other("dashboard offline")))
        }

        fn log_stats(&mut self, _rows: &[StatsRow]) -> Result<()> {
            self.attempts += 1;
            Err(PairsiftError::Io(std::io::Error::other("dashboard offline")))
        }
    }

    #[test]
    fn test_flush_swallows_sink_errors() {
        let mut sink = FailingSink { attempts: 0 };
        flush_best_effort(&mut sink, &[], &[]);
        // Stats are still attempted after the prediction flush fails.
        assert_eq!(sink.attempts, 2);
    }

    #[test]
    fn test_noop_sink_accepts_everything() {
        let mut sink = NoopSink;
        assert!(sink.log_config(&Config::default()).is_ok());
        assert!(sink.log_predictions(&[]).is_ok());
        assert!(sink.log_stats(&[]).is_ok());
    }
}
