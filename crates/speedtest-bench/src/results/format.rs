//! Number and table formatting utilities.

use std::time::Duration;

/// Width of every column of the result table.
pub const COLUMN_WIDTH: usize = 20;

/// Format bytes per second as human-readable throughput.
pub fn format_throughput(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return "0 B/s".to_string();
    }

    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}

/// Throughput of `bytes` moved in `elapsed`, zero for sub-millisecond samples.
pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    if elapsed < Duration::from_millis(1) {
        return 0.0;
    }
    bytes as f64 / elapsed.as_secs_f64()
}

/// Format a KB/s rate for the result table.
pub fn format_rate(kb_per_sec: f64) -> String {
    format!("{kb_per_sec:.2}")
}

/// Right-pad each column to [`COLUMN_WIDTH`] and join them.
pub fn format_row<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| format!("{:<width$}", c.as_ref(), width = COLUMN_WIDTH))
        .collect()
}
