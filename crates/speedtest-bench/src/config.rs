//! Configuration types for the transfer benchmark.

use std::path::PathBuf;

use speedtest_core::error::{Result, SpeedtestError};
use speedtest_core::size::parse_size;

/// Requested test file size when none is given.
pub const DEFAULT_FILE_SIZE: &str = "2MB";

/// Read/write buffer used by streaming and in-memory transfers.
pub const DEFAULT_BUFFER_SIZE: usize = 32768;

/// How library-mediated transfers move bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// One whole-file `put`/`get` per direction.
    #[default]
    Normal,
    /// Manual read/write loop over client streams.
    Streaming,
    /// Zero device to null device through the client, no local file.
    InMemory,
}

impl TransferMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Streaming => "streaming",
            Self::InMemory => "in-memory",
        }
    }

    /// Mode selected by the `--streaming` / `--in-memory` switches.
    /// In-memory wins when both are given.
    pub fn from_flags(streaming: bool, in_memory: bool) -> Self {
        if in_memory {
            Self::InMemory
        } else if streaming {
            Self::Streaming
        } else {
            Self::Normal
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Settings for one benchmark run. The harness takes it by value and only
/// hands out shared references afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkConfiguration {
    /// Target system id; the user's default storage system when `None`.
    pub system_id: Option<String>,
    /// Local test file; `$HOME/sftp-file` when `None`.
    pub file_path: Option<PathBuf>,
    pub upload: bool,
    pub download: bool,
    /// Requested size, human readable (`2MB`).
    pub file_size: String,
    pub iterations: usize,
    pub mode: TransferMode,
    /// Buffer size in bytes for streaming and in-memory modes.
    pub buffer_size: usize,
    pub verbose: bool,
    pub debug: bool,
    /// Enable colored output.
    pub color: bool,
    /// Explicit cache directory (below `AGAVE_CACHE_DIR`, above `$HOME/.agave`).
    pub cache_dir: Option<PathBuf>,
}

impl Default for BenchmarkConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchmarkConfiguration {
    /// Create a configuration with defaults: both directions, `2MB`, one
    /// iteration, normal mode.
    pub fn new() -> Self {
        Self {
            system_id: None,
            file_path: None,
            upload: true,
            download: true,
            file_size: DEFAULT_FILE_SIZE.to_string(),
            iterations: 1,
            mode: TransferMode::Normal,
            buffer_size: DEFAULT_BUFFER_SIZE,
            verbose: false,
            debug: false,
            color: false,
            cache_dir: None,
        }
    }

    /// Parsed byte count of [`Self::file_size`].
    pub fn file_size_bytes(&self) -> Result<u64> {
        parse_size(&self.file_size)
    }

    /// Check the configuration before anything is provisioned.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(SpeedtestError::InvalidConfiguration(
                "buffer size must be greater than zero".to_string(),
            ));
        }
        if self.iterations == 0 {
            return Err(SpeedtestError::InvalidConfiguration(
                "iteration count must be at least 1".to_string(),
            ));
        }
        self.file_size_bytes()?;
        Ok(())
    }

    /// Whether progress should be printed to stdout.
    pub fn is_verbose(&self) -> bool {
        self.verbose || self.debug
    }
}
