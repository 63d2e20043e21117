//! Timing capture and the result table.

pub mod format;

use std::time::{Duration, Instant};

use speedtest_core::error::SpeedtestError;

pub use format::{bytes_per_second, format_rate, format_row, format_throughput};

/// Column headers of the result table.
pub const RESULT_TABLE_HEADER: [&str; 5] = [
    "File Size",
    "Upload time(ms)",
    "Upload Rate",
    "Download time(ms)",
    "Download Rate",
];

/// Start/end instants of one upload and one download.
///
/// A direction that never ran keeps `None` stamps and reports 0 ms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTiming {
    pub upload_start: Option<Instant>,
    pub upload_end: Option<Instant>,
    pub download_start: Option<Instant>,
    pub download_end: Option<Instant>,
    /// Bytes moved per direction.
    pub length: u64,
}

impl TransferTiming {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            ..Self::default()
        }
    }

    pub fn upload_elapsed(&self) -> Duration {
        elapsed(self.upload_start, self.upload_end)
    }

    pub fn download_elapsed(&self) -> Duration {
        elapsed(self.download_start, self.download_end)
    }

    /// Derive elapsed milliseconds and KB/s rates.
    pub fn result(&self) -> TransferResult {
        let upload_ms = millis(self.upload_elapsed());
        let download_ms = millis(self.download_elapsed());
        TransferResult {
            file_size: self.length,
            upload_ms,
            upload_rate: kb_per_second(self.length, upload_ms),
            download_ms,
            download_rate: kb_per_second(self.length, download_ms),
        }
    }
}

fn elapsed(start: Option<Instant>, end: Option<Instant>) -> Duration {
    match (start, end) {
        (Some(start), Some(end)) => end.saturating_duration_since(start),
        _ => Duration::ZERO,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `(bytes / 1024) / (ms / 1000)`, zero below one millisecond.
pub fn kb_per_second(bytes: u64, elapsed_ms: u64) -> f64 {
    if elapsed_ms < 1 {
        return 0.0;
    }
    (bytes as f64 / 1024.0) / (elapsed_ms as f64 / 1000.0)
}

/// One row of the result table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferResult {
    pub file_size: u64,
    pub upload_ms: u64,
    /// KB/s
    pub upload_rate: f64,
    pub download_ms: u64,
    /// KB/s
    pub download_rate: f64,
}

impl TransferResult {
    pub fn to_row(&self) -> String {
        format_row(&[
            self.file_size.to_string(),
            self.upload_ms.to_string(),
            format_rate(self.upload_rate),
            self.download_ms.to_string(),
            format_rate(self.download_rate),
        ])
    }
}

/// Outcome of one cleanup step.
#[derive(Debug)]
pub struct CleanupOutcome {
    pub step: &'static str,
    /// Failure message; `None` when the step succeeded.
    pub error: Option<String>,
}

impl CleanupOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything a run produced: rows, the transfer-phase failure if any, and
/// what happened during cleanup.
#[derive(Debug, Default)]
pub struct BenchmarkReport {
    pub rows: Vec<TransferResult>,
    pub failure: Option<SpeedtestError>,
    pub cleanup: Vec<CleanupOutcome>,
}

impl BenchmarkReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Header line followed by one line per row, each newline-terminated.
    pub fn render_table(&self) -> String {
        let mut out = format_row(&RESULT_TABLE_HEADER);
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.to_row());
            out.push('\n');
        }
        out
    }

    pub fn failed_cleanup_steps(&self) -> impl Iterator<Item = &CleanupOutcome> {
        self.cleanup.iter().filter(|o| !o.succeeded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_is_zero_below_one_millisecond() {
        assert_eq!(kb_per_second(2_097_152, 0), 0.0);
        assert_eq!(kb_per_second(2048, 1000), 2.0);
    }

    #[test]
    fn test_disabled_direction_reports_zero() {
        let start = Instant::now();
        let mut timing = TransferTiming::new(2_097_152);
        timing.upload_start = Some(start);
        timing.upload_end = Some(start + Duration::from_millis(500));

        let result = timing.result();
        assert_eq!(result.upload_ms, 500);
        assert_eq!(result.upload_rate, 4096.0);
        assert_eq!(result.download_ms, 0);
        assert_eq!(result.download_rate, 0.0);
    }

    #[test]
    fn test_table_layout() {
        let report = BenchmarkReport {
            rows: vec![TransferResult {
                file_size: 1024,
                upload_ms: 10,
                upload_rate: 100.0,
                download_ms: 20,
                download_rate: 50.0,
            }],
            ..BenchmarkReport::default()
        };
        let table = report.render_table();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("File Size           Upload time(ms)     Upload Rate"));
        assert_eq!(lines[1].len(), 100);
        let columns: Vec<&str> = lines[1].split_whitespace().collect();
        assert_eq!(columns, ["1024", "10", "100.00", "20", "50.00"]);
    }
}
