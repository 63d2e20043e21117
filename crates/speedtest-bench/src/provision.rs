//! Local test data for uploads.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use speedtest_core::error::{Result, SpeedtestError};
use speedtest_core::size::parse_size;
use tracing::{debug, info};

/// File name used under `$HOME` when no test file is given.
pub const DEFAULT_TEST_FILE_NAME: &str = "sftp-file";

/// Source of bytes for in-memory uploads.
pub const ZERO_DEVICE: &str = "/dev/zero";

const BLOCK_SIZE: usize = 4096;

/// Where the test file came from. Only defaulted files are deleted after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestFileOrigin {
    UserSupplied,
    Default,
    ZeroDevice,
}

/// The local file uploaded by each iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFile {
    path: PathBuf,
    length: u64,
    origin: TestFileOrigin,
}

impl TestFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes transferred per direction.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn origin(&self) -> TestFileOrigin {
        self.origin
    }

    /// Final path component, used as the remote file name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| DEFAULT_TEST_FILE_NAME.to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Directory holding the file (`.` for bare names).
    pub fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn is_zero_device(&self) -> bool {
        self.origin == TestFileOrigin::ZeroDevice
    }

    /// Delete the file if it was generated at the default location.
    /// Returns whether a file was removed.
    pub fn remove_if_generated(&self) -> std::io::Result<bool> {
        if self.origin != TestFileOrigin::Default {
            return Ok(false);
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Default test file location: `$HOME/sftp-file`.
pub fn default_test_file_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_TEST_FILE_NAME))
        .ok_or_else(|| {
            SpeedtestError::InvalidConfiguration(
                "cannot determine home directory for the default test file".to_string(),
            )
        })
}

/// Make sure a test file of `size` exists.
///
/// In-memory runs use the zero device and create nothing. An existing file
/// must already have the requested length; it is never rewritten.
pub fn provision(path: Option<&Path>, size: &str, in_memory: bool) -> Result<TestFile> {
    let length = parse_size(size)?;

    if in_memory {
        debug!(length, "Using the zero device as test data");
        return Ok(TestFile {
            path: PathBuf::from(ZERO_DEVICE),
            length,
            origin: TestFileOrigin::ZeroDevice,
        });
    }

    let (path, origin) = match path {
        Some(p) => (p.to_path_buf(), TestFileOrigin::UserSupplied),
        None => (default_test_file_path()?, TestFileOrigin::Default),
    };

    match fs::metadata(&path) {
        Ok(meta) => {
            if meta.len() != length {
                return Err(SpeedtestError::TestFileSizeMismatch {
                    path,
                    expected: length,
                    actual: meta.len(),
                });
            }
            debug!(path = %path.display(), length, "Reusing existing test file");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            write_random_file(&path, length)?;
            info!(path = %path.display(), length, "Generated test file");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(TestFile {
        path,
        length,
        origin,
    })
}

/// Write `length` pseudo-random bytes in 4 KiB blocks.
fn write_random_file(path: &Path, length: u64) -> Result<()> {
    let mut rng = ChaCha8Rng::seed_from_u64(rand::random());
    let mut out = BufWriter::new(File::create(path)?);
    let mut block = [0u8; BLOCK_SIZE];
    let mut remaining = length;

    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(BLOCK_SIZE, |r| r.min(BLOCK_SIZE));
        rng.fill_bytes(&mut block[..n]);
        out.write_all(&block[..n])?;
        remaining -= n as u64;
    }

    out.flush()?;
    Ok(())
}
