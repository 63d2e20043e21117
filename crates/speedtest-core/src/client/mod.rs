//! Data-client abstraction used by library-mediated transfers.
//!
//! Protocol drivers (SFTP, GridFTP, S3) live outside this workspace; they
//! plug in through [`RemoteDataClient`] and a [`ClientFactory`]. The only
//! driver shipped here is [`LocalDataClient`], which maps an endpoint onto a
//! local directory.

mod local;

use std::io::{Read, Write};
use std::path::Path;

pub use local::LocalDataClient;

use crate::auth::Session;
use crate::endpoint::Protocol;
use crate::error::{Result, SpeedtestError};

/// Operations the benchmark needs from a remote storage client.
///
/// Remote paths are relative to the endpoint's root unless absolute.
pub trait RemoteDataClient {
    /// Open the connection and authenticate with the endpoint credential.
    fn authenticate(&mut self) -> Result<()>;

    /// Create `path` and any missing parents.
    fn mkdirs(&mut self, path: &str) -> Result<()>;

    /// Upload a whole local file.
    fn put(&mut self, local: &Path, remote: &str) -> Result<()>;

    /// Download a whole remote file.
    fn get(&mut self, remote: &str, local: &Path) -> Result<()>;

    fn input_stream(&mut self, remote: &str) -> Result<Box<dyn Read>>;

    fn output_stream(&mut self, remote: &str) -> Result<Box<dyn Write>>;

    /// Delete a file or a directory tree.
    fn delete(&mut self, remote: &str) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    /// Absolute form of `remote` on the endpoint.
    fn resolve_path(&self, remote: &str) -> Result<String>;
}

/// Builds a data client for an authenticated session.
pub trait ClientFactory {
    fn create(&self, session: &Session) -> Result<Box<dyn RemoteDataClient>>;
}

/// Factory for the drivers available in this build.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClientFactory;

impl ClientFactory for DefaultClientFactory {
    fn create(&self, session: &Session) -> Result<Box<dyn RemoteDataClient>> {
        let endpoint = &session.endpoint;
        match endpoint.protocol {
            Protocol::Local => {
                let root = endpoint.root_dir.as_deref().unwrap_or("/");
                Ok(Box::new(LocalDataClient::new(root)))
            }
            protocol => Err(SpeedtestError::remote(format!(
                "no data client driver available for {protocol} system {}",
                endpoint.id
            ))),
        }
    }
}
