//! CSV sink that guarantees a header row before the first data row.
//!
//! Opening an existing, non-empty file appends below whatever header it
//! already has; a missing or empty file gets the header written first.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::tick::TickReport;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError + '_ {
    move |source| SinkError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Create `path` with `header` as its first row unless it already has content.
///
/// Returns `true` if the header was written.
pub fn ensure_header<S: AsRef<str>>(path: &Path, header: &[S]) -> Result<bool, SinkError> {
    let has_content = match fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => return Err(io_err(path)(e)),
    };
    if has_content {
        return Ok(false);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let file = File::create(path).map_err(io_err(path))?;
    let mut wtr = csv::Writer::from_writer(file);
    wtr.write_record(header.iter().map(|h| h.as_ref()))?;
    wtr.flush().map_err(io_err(path))?;
    Ok(true)
}

/// Column label for a percentile ratio: 0.95 → `p95`, 0.999 → `p99.9`.
pub fn percentile_label(ratio: f64) -> String {
    format!("p{}", (ratio * 1e4).round() / 1e2)
}

/// Header matching [`CsvSink::append_report`] rows.
pub fn report_header(percentiles: &[f64]) -> Vec<String> {
    let mut header = vec!["tick".to_string(), "timestamp".to_string()];
    header.extend(percentiles.iter().map(|&p| percentile_label(p)));
    header.push("distance".to_string());
    header
}

/// Append-only CSV writer.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl std::fmt::Debug for CsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink").field("path", &self.path).finish()
    }
}

impl CsvSink {
    /// Open `path` for appending, writing `header` first if the file is new.
    pub fn open<S: AsRef<str>>(path: &Path, header: &[S]) -> Result<Self, SinkError> {
        if ensure_header(path, header)? {
            info!(path = %path.display(), "created CSV sink");
        }
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(io_err(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: csv::Writer::from_writer(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_row<I, T>(&mut self, record: I) -> Result<(), SinkError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(record)?;
        self.writer.flush().map_err(io_err(&self.path))?;
        Ok(())
    }

    /// Append one report; an undefined distance is written as an empty field.
    pub fn append_report(&mut self, report: &TickReport) -> Result<(), SinkError> {
        let mut row = vec![report.tick.to_string(), report.timestamp.to_rfc3339()];
        row.extend(report.percentiles.iter().map(|e| e.value.to_string()));
        row.push(report.distance.map(|d| format!("{d:.6}")).unwrap_or_default());
        self.append_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(percentile_label(0.95), "p95");
        assert_eq!(percentile_label(0.99), "p99");
        assert_eq!(percentile_label(0.999), "p99.9");
        assert_eq!(percentile_label(0.5), "p50");
    }

    #[test]
    fn header_layout() {
        assert_eq!(
            report_header(&[0.95, 0.99]),
            vec!["tick", "timestamp", "p95", "p99", "distance"]
        );
    }
}
