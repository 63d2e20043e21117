//! Transfer strategies and the benchmark harness.

mod harness;
mod library;
mod native;

pub use harness::{BenchmarkHarness, HarnessState, authenticate_session, authenticate_with};
pub use library::{LibraryStrategy, NULL_DEVICE, REMOTE_NULL_DEVICE, REMOTE_ZERO_DEVICE};
pub use native::{
    NativeOptions, NativeStrategy, SftpDirectoryClient, batch_script_download, batch_script_upload,
};

use speedtest_core::auth::Session;
use speedtest_core::client::RemoteDataClient;
use speedtest_core::error::Result;

use crate::config::BenchmarkConfiguration;
use crate::provision::TestFile;

/// What a strategy needs to know about the run in progress.
#[derive(Debug, Clone, Copy)]
pub struct TransferContext<'a> {
    pub config: &'a BenchmarkConfiguration,
    pub session: &'a Session,
    pub test_file: &'a TestFile,
    /// Remote working directory, relative to the endpoint root.
    pub remote_dir: &'a str,
    /// Absolute form of [`Self::remote_dir`] as reported by the client.
    pub remote_dir_abs: &'a str,
}

impl TransferContext<'_> {
    /// Remote path of the uploaded test file.
    pub fn remote_file(&self) -> String {
        format!("{}/{}", self.remote_dir, self.test_file.file_name())
    }

    /// Absolute remote path of the uploaded test file.
    pub fn remote_file_abs(&self) -> String {
        format!("{}/{}", self.remote_dir_abs, self.test_file.file_name())
    }
}

/// One way of moving the test file to the endpoint and back.
///
/// The harness times each `run_upload`/`run_download` call. An `Err` aborts
/// the remaining iterations and is recorded on the report.
pub trait TransferStrategy {
    fn name(&self) -> &'static str;

    /// Called once before the first iteration.
    fn prepare(&mut self, _ctx: &TransferContext<'_>) -> Result<()> {
        Ok(())
    }

    fn run_upload(&mut self, client: &mut dyn RemoteDataClient, ctx: &TransferContext<'_>) -> Result<()>;

    fn run_download(&mut self, client: &mut dyn RemoteDataClient, ctx: &TransferContext<'_>)
    -> Result<()>;

    /// Release anything acquired in `prepare` or construction. Must be safe to
    /// call more than once.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
