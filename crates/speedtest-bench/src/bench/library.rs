//! Transfers driven through the in-process data client.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use speedtest_core::client::RemoteDataClient;
use speedtest_core::error::{Result, SpeedtestError};
use tracing::{debug, warn};

use super::{TransferContext, TransferStrategy};
use crate::config::TransferMode;
use crate::provision::ZERO_DEVICE;

/// Local sink for in-memory downloads.
pub const NULL_DEVICE: &str = "/dev/null";
/// Remote sink for in-memory uploads.
pub const REMOTE_NULL_DEVICE: &str = "/dev/null";
/// Remote source for in-memory downloads.
pub const REMOTE_ZERO_DEVICE: &str = "/dev/zero";

/// Download writers buffer this many transfer buffers.
const DOWNLOAD_BUFFER_FACTOR: usize = 2 * 32;

/// Library-mediated transfers in normal, streaming or in-memory mode.
///
/// Per-iteration failures are logged and swallowed: the timed sample still
/// counts, and the run continues with the next transfer.
#[derive(Debug, Clone)]
pub struct LibraryStrategy {
    mode: TransferMode,
    buffer_size: usize,
    zero_device: PathBuf,
    null_device: PathBuf,
    remote_zero: String,
    remote_null: String,
}

impl LibraryStrategy {
    pub fn new(mode: TransferMode, buffer_size: usize) -> Self {
        Self {
            mode,
            buffer_size: buffer_size.max(1),
            zero_device: PathBuf::from(ZERO_DEVICE),
            null_device: PathBuf::from(NULL_DEVICE),
            remote_zero: REMOTE_ZERO_DEVICE.to_string(),
            remote_null: REMOTE_NULL_DEVICE.to_string(),
        }
    }

    /// Replace the local zero/null devices used in in-memory mode.
    #[must_use]
    pub fn with_local_devices(mut self, zero: impl Into<PathBuf>, null: impl Into<PathBuf>) -> Self {
        self.zero_device = zero.into();
        self.null_device = null.into();
        self
    }

    /// Replace the remote zero/null devices used in in-memory mode.
    #[must_use]
    pub fn with_remote_devices(mut self, zero: impl Into<String>, null: impl Into<String>) -> Self {
        self.remote_zero = zero.into();
        self.remote_null = null.into();
        self
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Fixed-size cycles needed to move `length` bytes.
    pub fn in_memory_cycles(&self, length: u64) -> u64 {
        length.div_ceil(self.buffer_size as u64)
    }

    fn upload(&self, client: &mut dyn RemoteDataClient, ctx: &TransferContext<'_>) -> Result<()> {
        match self.mode {
            TransferMode::Normal => client.put(ctx.test_file.path(), &ctx.remote_file()),
            TransferMode::Streaming => {
                let mut input = File::open(ctx.test_file.path())?;
                let mut output = client.output_stream(&ctx.remote_file())?;
                copy_to_end(&mut input, &mut output, self.buffer_size)
            }
            TransferMode::InMemory => {
                let mut input = File::open(&self.zero_device)?;
                let mut output = client.output_stream(&self.remote_null)?;
                self.copy_cycles(&mut input, &mut output, ctx.test_file.length())
            }
        }
    }

    fn download(&self, client: &mut dyn RemoteDataClient, ctx: &TransferContext<'_>) -> Result<()> {
        match self.mode {
            TransferMode::Normal => client.get(&ctx.remote_file(), ctx.test_file.path()),
            TransferMode::Streaming => {
                let mut input = client.input_stream(&ctx.remote_file())?;
                let mut output = self.download_sink(ctx.test_file.path())?;
                copy_to_end(&mut input, &mut output, self.buffer_size)
            }
            TransferMode::InMemory => {
                let mut input = client.input_stream(&self.remote_zero)?;
                let mut output = self.download_sink(&self.null_device)?;
                self.copy_cycles(&mut input, &mut output, ctx.test_file.length())
            }
        }
    }

    fn download_sink(&self, path: &Path) -> Result<BufWriter<File>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(BufWriter::with_capacity(
            self.buffer_size.saturating_mul(DOWNLOAD_BUFFER_FACTOR),
            file,
        ))
    }

    /// Exactly `ceil(length / buffer)` full-buffer read/write cycles.
    fn copy_cycles(&self, input: &mut dyn Read, output: &mut dyn Write, length: u64) -> Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        for _ in 0..self.in_memory_cycles(length) {
            input.read_exact(&mut buf)?;
            output.write_all(&buf)?;
        }
        output.flush()?;
        Ok(())
    }
}

/// Read until end of stream with a `buffer_size` buffer, then flush.
fn copy_to_end(input: &mut dyn Read, output: &mut dyn Write, buffer_size: usize) -> Result<()> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SpeedtestError::Io(e)),
        };
        output.write_all(&buf[..n])?;
    }
    output.flush()?;
    Ok(())
}

impl TransferStrategy for LibraryStrategy {
    fn name(&self) -> &'static str {
        "library"
    }

    fn run_upload(&mut self, client: &mut dyn RemoteDataClient, ctx: &TransferContext<'_>) -> Result<()> {
        if let Err(e) = self.upload(client, ctx) {
            warn!(mode = %self.mode, error = %e, "Upload failed");
        } else {
            debug!(mode = %self.mode, "Upload finished");
        }
        Ok(())
    }

    fn run_download(
        &mut self,
        client: &mut dyn RemoteDataClient,
        ctx: &TransferContext<'_>,
    ) -> Result<()> {
        if let Err(e) = self.download(client, ctx) {
            warn!(mode = %self.mode, error = %e, "Download failed");
        } else {
            debug!(mode = %self.mode, "Download finished");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_count_rounds_up() {
        let strategy = LibraryStrategy::new(TransferMode::InMemory, 4096);
        assert_eq!(strategy.in_memory_cycles(8192), 2);
        assert_eq!(strategy.in_memory_cycles(8193), 3);
        assert_eq!(strategy.in_memory_cycles(1), 1);
        assert_eq!(strategy.in_memory_cycles(0), 0);
    }

    #[test]
    fn test_copy_to_end_copies_everything() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut out = Vec::new();
        copy_to_end(&mut data.as_slice(), &mut out, 1000).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_cycles_writes_whole_buffers() {
        let strategy = LibraryStrategy::new(TransferMode::InMemory, 3);
        let mut input: &[u8] = &[0u8; 16];
        let mut out = Vec::new();
        strategy.copy_cycles(&mut input, &mut out, 7).unwrap();
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn test_copy_cycles_short_source_errors() {
        let strategy = LibraryStrategy::new(TransferMode::InMemory, 8);
        let mut input: &[u8] = &[0u8; 4];
        let mut out = Vec::new();
        assert!(strategy.copy_cycles(&mut input, &mut out, 8).is_err());
    }
}
