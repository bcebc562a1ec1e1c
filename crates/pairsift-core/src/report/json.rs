//! Local JSON report directory.
//!
//! Layout:
//! - `predictions_table.json`: latest prediction table snapshot
//! - `stats_table.json`: latest stats table snapshot
//! - `flushes.jsonl`: one line per flush, appended
//! - `run_config.json`: the configuration the run started with
//!
//! Snapshots hold the whole table, so each flush costs I/O proportional to
//! the rows stored so far. They are written as compact JSON.

use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::stats::{PredictionRow, StatsRow};

use super::writer::OutputWriter;
use super::{ReportSink, PREDICTION_COLUMNS, STATS_COLUMNS};

pub const PREDICTIONS_FILE: &str = "predictions_table.json";
pub const STATS_FILE: &str = "stats_table.json";
pub const HISTORY_FILE: &str = "flushes.jsonl";
pub const CONFIG_FILE: &str = "run_config.json";

#[derive(Serialize)]
struct Table<'a, T> {
    columns: [&'static str; 3],
    data: &'a [T],
}

#[derive(Serialize)]
struct FlushRecord<'a> {
    table: &'a str,
    rows: usize,
    unix_time: u64,
}

/// Writes table snapshots into a report directory.
pub struct JsonReportSink {
    dir: PathBuf,
    flushes: usize,
}

impl JsonReportSink {
    /// Create the report directory if needed.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        tracing::info!("Writing report tables to {:?}", dir);
        Ok(Self {
            dir: dir.to_path_buf(),
            flushes: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of successful snapshot writes so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Replace `name` with a new snapshot. Written to a temp file first so an
    /// interrupted run never leaves a truncated table behind.
    fn write_snapshot<T: Serialize>(&self, name: &str, snapshot: &T) -> Result<()> {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));

        let mut writer = OutputWriter::new(BufWriter::new(File::create(&tmp)?));
        writer.write(snapshot)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn append_history(&self, table: &str, rows: usize) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(HISTORY_FILE))?;
        let unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut writer = OutputWriter::new(file);
        writer.write(&FlushRecord {
            table,
            rows,
            unix_time,
        })?;
        writer.flush()?;
        Ok(())
    }
}

impl ReportSink for JsonReportSink {
    fn log_config(&mut self, config: &Config) -> Result<()> {
        self.write_snapshot(CONFIG_FILE, config)
    }

    fn log_predictions(&mut self, rows: &[PredictionRow]) -> Result<()> {
        self.write_snapshot(
            PREDICTIONS_FILE,
            &Table {
                columns: PREDICTION_COLUMNS,
                data: rows,
            },
        )?;
        self.append_history("predictions", rows.len())?;
        self.flushes += 1;
        tracing::debug!("Flushed {} prediction rows", rows.len());
        Ok(())
    }

    fn log_stats(&mut self, rows: &[StatsRow]) -> Result<()> {
        self.write_snapshot(
            STATS_FILE,
            &Table {
                columns: STATS_COLUMNS,
                data: rows,
            },
        )?;
        self.append_history("stats", rows.len())?;
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(text: &str, score: f32) -> PredictionRow {
        PredictionRow {
            key: "000001".to_string(),
            image: None,
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_snapshots_replace_previous() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonReportSink::create(&dir.path().join("report")).unwrap();

        sink.log_predictions(&[prediction("red car", 0.9)]).unwrap();
        sink.log_predictions(&[prediction("red car", 0.9), prediction("dog", 0.4)])
            .unwrap();

        let content = fs::read_to_string(sink.dir().join(PREDICTIONS_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["columns"][1], "Predicted text");
        assert_eq!(json["data"].as_array().unwrap().len(), 2);
        assert_eq!(json["data"][1]["text"], "dog");
    }

    #[test]
    fn test_history_appends_one_line_per_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonReportSink::create(dir.path()).unwrap();

        sink.log_predictions(&[]).unwrap();
        sink.log_stats(&[StatsRow::new("total_imgs", 1.0, 1.0)])
            .unwrap();

        let history = fs::read_to_string(dir.path().join(HISTORY_FILE)).unwrap();
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("\"table\":\"stats\""));
        assert_eq!(sink.flushes(), 2);

        let stats = fs::read_to_string(dir.path().join(STATS_FILE)).unwrap();
        assert!(stats.contains("Fraction"));
        assert!(stats.contains("total_imgs"));
    }

    #[test]
    fn test_run_config_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonReportSink::create(dir.path()).unwrap();

        let mut config = Config::default();
        config.matching.threshold = 0.25;
        sink.log_config(&config).unwrap();

        let content = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["matching"]["threshold"], 0.25);
        assert_eq!(json["embedding"]["model_type"], config.embedding.model_type);
        assert_eq!(sink.flushes(), 0);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonReportSink::create(dir.path()).unwrap();
        sink.log_stats(&[]).unwrap();

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
