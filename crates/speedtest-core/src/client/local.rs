use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};

use super::RemoteDataClient;
use crate::error::{Result, SpeedtestError};

/// Character devices addressed as-is instead of under the root. In-memory
/// transfers write to the remote null device and read the remote zero device.
const DEVICE_PATHS: [&str; 2] = ["/dev/null", "/dev/zero"];

fn is_device(remote: &str) -> bool {
    DEVICE_PATHS.contains(&remote)
}

/// Data client for `local` endpoints: remote paths are mapped under a root
/// directory on this machine.
#[derive(Debug, Clone)]
pub struct LocalDataClient {
    root: PathBuf,
    connected: bool,
}

impl LocalDataClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            connected: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Map a remote path under the root. Absolute paths are re-rooted and
    /// parent components are rejected; [`DEVICE_PATHS`] map to themselves.
    fn map(&self, remote: &str) -> Result<PathBuf> {
        if is_device(remote) {
            return Ok(PathBuf::from(remote));
        }
        let mut mapped = self.root.clone();
        for component in Path::new(remote).components() {
            match component {
                Component::Normal(part) => mapped.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(SpeedtestError::remote(format!(
                        "path escapes the system root: {remote}"
                    )));
                }
            }
        }
        Ok(mapped)
    }
}

impl RemoteDataClient for LocalDataClient {
    fn authenticate(&mut self) -> Result<()> {
        if !self.root.is_dir() {
            return Err(SpeedtestError::remote(format!(
                "system root {} is not a directory",
                self.root.display()
            )));
        }
        self.connected = true;
        debug!(root = %self.root.display(), "Connected local data client");
        Ok(())
    }

    fn mkdirs(&mut self, path: &str) -> Result<()> {
        let target = self.map(path)?;
        fs::create_dir_all(&target)
            .map_err(|e| SpeedtestError::remote_with(format!("mkdirs {path}"), e))
    }

    fn put(&mut self, local: &Path, remote: &str) -> Result<()> {
        let target = self.map(remote)?;
        let copied = fs::copy(local, &target)
            .map_err(|e| SpeedtestError::remote_with(format!("put {remote}"), e))?;
        trace!(bytes = copied, remote, "put");
        Ok(())
    }

    fn get(&mut self, remote: &str, local: &Path) -> Result<()> {
        let source = self.map(remote)?;
        let copied = fs::copy(&source, local)
            .map_err(|e| SpeedtestError::remote_with(format!("get {remote}"), e))?;
        trace!(bytes = copied, remote, "get");
        Ok(())
    }

    fn input_stream(&mut self, remote: &str) -> Result<Box<dyn Read>> {
        let source = self.map(remote)?;
        let file = File::open(&source)
            .map_err(|e| SpeedtestError::remote_with(format!("open {remote}"), e))?;
        Ok(Box::new(file))
    }

    fn output_stream(&mut self, remote: &str) -> Result<Box<dyn Write>> {
        let target = self.map(remote)?;
        let file = File::create(&target)
            .map_err(|e| SpeedtestError::remote_with(format!("create {remote}"), e))?;
        Ok(Box::new(file))
    }

    fn delete(&mut self, remote: &str) -> Result<()> {
        if is_device(remote) {
            return Err(SpeedtestError::remote(format!("refusing to delete {remote}")));
        }
        let target = self.map(remote)?;
        if target == self.root {
            return Err(SpeedtestError::remote("refusing to delete the system root"));
        }
        let result = if target.is_dir() {
            fs::remove_dir_all(&target)
        } else {
            fs::remove_file(&target)
        };
        result.map_err(|e| SpeedtestError::remote_with(format!("delete {remote}"), e))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn resolve_path(&self, remote: &str) -> Result<String> {
        Ok(self.map(remote)?.to_string_lossy().into_owned())
    }
}
