//! Cumulative CSV table of weighted metrics, one row per evaluation run.

use std::fs::{self, OpenOptions};
use std::path::Path;

use robustcam_core::{MetricsRecord, Result};
use tracing::debug;

/// Appends `record` to the table at `path`
///
/// The header row is written only when the file is new or empty. Parent
/// directories are created as needed.
pub fn append_record(path: &Path, record: &MetricsRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);
    writer.serialize(record)?;
    writer.flush()?;

    debug!("Appended metrics row to {}", path.display());
    Ok(())
}

/// Reads every row of the table
pub fn read_records(path: &Path) -> Result<Vec<MetricsRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<MetricsRecord>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(noise: f64) -> MetricsRecord {
        MetricsRecord {
            noise_multiplier: noise,
            f1_score: 0.5,
            precision: 0.75,
            recall: 0.5,
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/metrics.csv");

        append_record(&path, &record(0.0)).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = first.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Noise Multiplier,F1 Score,Precision,Recall");
        assert_eq!(lines[1], "0.0,0.5,0.75,0.5");

        append_record(&path, &record(2.0)).unwrap();
        let second = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = second.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Noise Multiplier,F1 Score,Precision,Recall");
        assert_eq!(lines[2], "2.0,0.5,0.75,0.5");
    }

    #[test]
    fn test_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.csv");

        append_record(&path, &record(0.0)).unwrap();
        append_record(&path, &record(1.5)).unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records, vec![record(0.0), record(1.5)]);
    }
}
