//! Upload/download throughput benchmark for remote storage systems.
//!
//! The benchmark authenticates against a system from the local registry,
//! creates a scratch directory on it, and times uploading and downloading a
//! test file through one of two paths:
//!
//! - **library**: the data client for the system's protocol, either with
//!   whole-file `put`/`get`, a manual buffered stream copy, or an in-memory
//!   zero-device to null-device copy
//! - **native**: the system's own `sftp` binary driven by batch scripts, with
//!   credentials written to a private temporary directory for the duration
//!   of the run
//!
//! # Usage
//!
//! ```text
//! speedtest <library|native|seal> [OPTIONS]
//!
//! Options (library and native):
//!   -s, --system <SYSTEM_ID>   System to benchmark (default storage system otherwise)
//!   -f, --file <PATH>          Local test file (default $HOME/sftp-file)
//!       --size <SIZE>          Test file size (default 2MB)
//!       --iter <N>             Iterations (default 1)
//!   -v, --verbose              Progress and per-iteration throughput
//!       --debug                Debug logging
//!       --cache-dir <DIR>      Credential cache (AGAVE_CACHE_DIR wins)
//!
//! Library only:
//!       --upload <BOOL> / --download <BOOL>
//!       --streaming | --in-memory
//!       --buffer-size <BYTES>  (default 32768)
//! ```

pub mod bench;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod process;
pub mod provision;
pub mod results;

pub use bench::{BenchmarkHarness, LibraryStrategy, NativeStrategy, TransferStrategy};
pub use cli::Cli;
pub use config::{BenchmarkConfiguration, TransferMode};
pub use process::{ProcessRunner, SystemProcessRunner};
pub use provision::{TestFile, provision};
pub use results::{BenchmarkReport, TransferResult};
