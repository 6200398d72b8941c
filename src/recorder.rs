// src/recorder.rs

use crate::types::TrafficSample;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Append-only session table: one row per processed frame, insertion
/// ordered, persisted wholesale when the stream ends.
pub struct SessionRecorder {
    rows: Vec<TrafficSample>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn append(&mut self, sample: TrafficSample) {
        self.rows.push(sample);
    }

    /// Write the whole table as CSV (header row, stable column order:
    /// frame number, flow, density). Flushing twice overwrites the
    /// destination; a write failure is fatal for the session.
    pub fn flush(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "💾 Session table saved: {} ({} rows)",
            path.display(),
            self.rows.len()
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn peak_flow(&self) -> usize {
        self.rows.iter().map(|r| r.flow).max().unwrap_or(0)
    }

    pub fn mean_density(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let total: usize = self.rows.iter().map(|r| r.density).sum();
        total as f64 / self.rows.len() as f64
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::TrafficEstimator;
    use std::collections::HashSet;

    fn sample(frame_index: u64, flow: usize, density: usize) -> TrafficSample {
        TrafficSample {
            frame_index,
            flow,
            density,
        }
    }

    #[test]
    fn test_flush_writes_header_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");

        let mut recorder = SessionRecorder::new();
        recorder.append(sample(0, 1, 1));
        recorder.append(sample(1, 2, 1));
        recorder.flush(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(
            lines[0],
            "Frame Number,Flow (vehicles/window),Density (vehicles/frame)"
        );
        assert_eq!(lines[1], "0,1,1");
        assert_eq!(lines[2], "1,2,1");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_second_flush_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.csv");

        let mut recorder = SessionRecorder::new();
        recorder.append(sample(0, 3, 3));
        recorder.flush(&path).unwrap();
        recorder.flush(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2); // header + one row
    }

    #[test]
    fn test_summary_accessors() {
        let mut recorder = SessionRecorder::new();
        assert!(recorder.is_empty());
        assert_eq!(recorder.peak_flow(), 0);
        assert_eq!(recorder.mean_density(), 0.0);

        recorder.append(sample(0, 2, 2));
        recorder.append(sample(1, 5, 4));
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.peak_flow(), 5);
        assert_eq!(recorder.mean_density(), 3.0);
    }

    // End-to-end over the estimator: frames 0–24 report {7}, frame 25
    // reports {7, 8}. Rows 0–24 must read flow=1 density=1, row 25
    // flow=2 density=2.
    #[test]
    fn test_session_table_for_steady_vehicle_then_arrival() {
        let mut estimator = TrafficEstimator::new();
        let mut recorder = SessionRecorder::new();

        for i in 0..25u64 {
            let set: HashSet<u32> = [7].into_iter().collect();
            recorder.append(estimator.observe(set, i));
        }
        let set: HashSet<u32> = [7, 8].into_iter().collect();
        recorder.append(estimator.observe(set, 25));

        assert_eq!(recorder.len(), 26);
        for row in &recorder.rows[..25] {
            assert_eq!(row.flow, 1);
            assert_eq!(row.density, 1);
        }
        let last = recorder.rows[25];
        assert_eq!(last.frame_index, 25);
        assert_eq!(last.flow, 2);
        assert_eq!(last.density, 2);
    }
}
