//! Transfers through a natively spawned `sftp` client.
//!
//! Credentials are materialized when the strategy is built, so the same
//! `sftp` launcher also serves [`SftpDirectoryClient`], which creates and
//! deletes the remote working directory with batch commands.

use std::cell::RefCell;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use speedtest_core::client::RemoteDataClient;
use speedtest_core::endpoint::{EndpointDescriptor, Protocol};
use speedtest_core::error::{NativeFailureCause, Result, SpeedtestError};
use tracing::{debug, info};

use super::{TransferContext, TransferStrategy};
use crate::credentials::CredentialBundle;
use crate::process::{CommandSpec, NATIVE_TRANSFER_TIMEOUT, ProcessRunner};

const SFTP_PROGRAM: &str = "sftp";
const SUBPROCESS_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";
const SUBPROCESS_SHELL: &str = "/bin/bash";

/// Batch script uploading `file_name` from `local_dir` into `remote_dir`.
pub fn batch_script_upload(local_dir: &Path, file_name: &str, remote_dir: &str) -> String {
    format!(
        "lcd {}\nput {file_name} {remote_dir}/{file_name}\nquit\n",
        local_dir.display()
    )
}

/// Batch script downloading `remote_dir/file_name` to `local_path`.
pub fn batch_script_download(local_path: &Path, file_name: &str, remote_dir: &str) -> String {
    let local_dir = local_path.parent().unwrap_or_else(|| Path::new("."));
    format!(
        "lcd {}\nget {remote_dir}/{file_name} {}\nquit\n",
        local_dir.display(),
        local_path.display()
    )
}

/// How `sftp` is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeOptions {
    pub program: String,
    pub timeout: Duration,
    /// Directory under which the per-run credential directory is created.
    pub temp_root: PathBuf,
    /// `HOME` of the subprocess.
    pub home: String,
    /// Agent socket forwarded to the subprocess when a key was registered.
    pub agent_socket: Option<String>,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self {
            program: SFTP_PROGRAM.to_string(),
            timeout: NATIVE_TRANSFER_TIMEOUT,
            temp_root: std::env::temp_dir(),
            home: dirs::home_dir()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_default(),
            agent_socket: std::env::var("SSH_AUTH_SOCK").ok(),
        }
    }
}

/// Runs `sftp` batch files against one endpoint with the run's credentials.
struct SftpLauncher {
    runner: Arc<dyn ProcessRunner>,
    options: NativeOptions,
    endpoint: EndpointDescriptor,
    credentials: RefCell<CredentialBundle>,
}

impl SftpLauncher {
    fn build_command(&self, batch: &Path) -> CommandSpec {
        let credentials = self.credentials.borrow();
        let mut command = CommandSpec::new(&self.options.program);

        if let Some(key) = credentials.private_key_path() {
            command = command.arg("-i").arg(key.to_string_lossy());
        }
        command = command
            .arg("-P")
            .arg(self.endpoint.port.to_string())
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("StrictHostKeyChecking=false")
            .arg("-b")
            .arg(batch.to_string_lossy())
            .arg(format!("{}@{}", self.endpoint.username(), self.endpoint.host))
            .clear_env();

        if let Some(askpass) = credentials.askpass_path() {
            command = command.env("SSH_ASKPASS", askpass.to_string_lossy());
        }
        command = command
            .env("DISPLAY", ":")
            .env("PATH", SUBPROCESS_PATH)
            .env("HOME", &self.options.home)
            .env("SHELL", SUBPROCESS_SHELL);

        if credentials.agent_registered()
            && let Some(socket) = &self.options.agent_socket
        {
            command = command.env("SSH_AUTH_SOCK", socket);
        }
        command
    }

    fn run_batch(&self, batch: &Path) -> Result<()> {
        let command = self.build_command(batch);
        let command_line = command.command_line();
        debug!(command = %command_line, "Running sftp batch");

        let output = self
            .runner
            .run(&command, self.options.timeout)
            .map_err(|e| SpeedtestError::NativeTransferFailed {
                command: command_line.clone(),
                output: String::new(),
                cause: NativeFailureCause::Spawn(e.to_string()),
            })?;

        if output.timed_out {
            return Err(SpeedtestError::NativeTransferFailed {
                command: command_line,
                output: output.output,
                cause: NativeFailureCause::Timeout(self.options.timeout),
            });
        }
        if output.status != Some(0) {
            return Err(SpeedtestError::NativeTransferFailed {
                command: command_line,
                output: output.output,
                cause: NativeFailureCause::ExitStatus(output.status),
            });
        }
        Ok(())
    }

    fn credential_dir(&self) -> Result<PathBuf> {
        self.credentials
            .borrow()
            .dir()
            .map(Path::to_path_buf)
            .ok_or_else(|| SpeedtestError::remote("native credentials were already released"))
    }

    fn write_batch(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.credential_dir()?.join(name);
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Write a one-off batch file, run it, and remove it again.
    fn run_script(&self, label: &str, contents: &str) -> Result<()> {
        let path = self.write_batch(&format!("{label}-{}.batch", uuid::Uuid::new_v4()), contents)?;
        let result = self.run_batch(&path);
        let _ = fs::remove_file(&path);
        result
    }
}

/// Native `sftp` transfers, one subprocess per timed sample.
///
/// A failed transfer is returned as [`SpeedtestError::NativeTransferFailed`],
/// which stops the remaining iterations.
pub struct NativeStrategy {
    launcher: Rc<SftpLauncher>,
    upload_batch: Option<PathBuf>,
    download_batch: Option<PathBuf>,
}

impl std::fmt::Debug for NativeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeStrategy")
            .field("options", &self.launcher.options)
            .field("credentials", &self.launcher.credentials)
            .field("upload_batch", &self.upload_batch)
            .field("download_batch", &self.download_batch)
            .finish_non_exhaustive()
    }
}

impl NativeStrategy {
    /// Strategy for `endpoint`, which must be an SFTP system. Credential
    /// material is written (and a protected key registered) right away.
    pub fn new(
        endpoint: &EndpointDescriptor,
        runner: Arc<dyn ProcessRunner>,
        options: NativeOptions,
    ) -> Result<Self> {
        if endpoint.protocol != Protocol::Sftp {
            return Err(SpeedtestError::InvalidConfiguration(format!(
                "native transfers only support sftp systems; {} uses {}",
                endpoint.id, endpoint.protocol
            )));
        }
        let credentials =
            CredentialBundle::materialize(endpoint, &options.temp_root, Arc::clone(&runner))?;
        Ok(Self {
            launcher: Rc::new(SftpLauncher {
                runner,
                options,
                endpoint: endpoint.clone(),
                credentials: RefCell::new(credentials),
            }),
            upload_batch: None,
            download_batch: None,
        })
    }

    /// Data client that manages remote directories through the same launcher.
    pub fn directory_client(&self) -> SftpDirectoryClient {
        SftpDirectoryClient {
            launcher: Rc::clone(&self.launcher),
        }
    }

    /// Per-run credential directory, until released.
    pub fn credential_dir(&self) -> Option<PathBuf> {
        self.launcher.credentials.borrow().dir().map(Path::to_path_buf)
    }

    /// The `sftp` invocation for a batch file.
    pub fn build_command(&self, batch: &Path) -> CommandSpec {
        self.launcher.build_command(batch)
    }

    fn transfer(&self, batch: Option<&Path>, direction: &str) -> Result<()> {
        let batch = batch.ok_or_else(|| {
            SpeedtestError::InvalidConfiguration(format!(
                "native {direction} requested before the strategy was prepared"
            ))
        })?;
        debug!(direction, "Starting native transfer");
        self.launcher.run_batch(batch)
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl TransferStrategy for NativeStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    /// Write the upload and download batch files into the credential directory.
    fn prepare(&mut self, ctx: &TransferContext<'_>) -> Result<()> {
        let file_name = ctx.test_file.file_name();
        let local_path = absolute(ctx.test_file.path());
        let local_dir = absolute(&ctx.test_file.parent_dir());
        let run_id = uuid::Uuid::new_v4();

        self.upload_batch = Some(self.launcher.write_batch(
            &format!("up-{run_id}.batch"),
            &batch_script_upload(&local_dir, &file_name, ctx.remote_dir_abs),
        )?);
        self.download_batch = Some(self.launcher.write_batch(
            &format!("down-{run_id}.batch"),
            &batch_script_download(&local_path, &file_name, ctx.remote_dir_abs),
        )?);
        info!(system = %ctx.session.endpoint.id, "Prepared native batch files");
        Ok(())
    }

    fn run_upload(&mut self, _client: &mut dyn RemoteDataClient, _ctx: &TransferContext<'_>) -> Result<()> {
        self.transfer(self.upload_batch.as_deref(), "upload")
    }

    fn run_download(
        &mut self,
        _client: &mut dyn RemoteDataClient,
        _ctx: &TransferContext<'_>,
    ) -> Result<()> {
        self.transfer(self.download_batch.as_deref(), "download")
    }

    /// Unregister the agent key and delete the credential directory, which
    /// also holds the batch files.
    fn release(&mut self) -> Result<()> {
        self.upload_batch = None;
        self.download_batch = None;
        self.launcher.credentials.borrow_mut().cleanup()
    }
}

/// Remote directory management over `sftp` batch commands.
///
/// Only what the harness needs around native transfers is supported; whole
/// file and stream operations belong to the strategy.
pub struct SftpDirectoryClient {
    launcher: Rc<SftpLauncher>,
}

impl SftpDirectoryClient {
    fn unsupported(operation: &str) -> SpeedtestError {
        SpeedtestError::remote(format!("{operation} is not supported by the native sftp client"))
    }
}

impl RemoteDataClient for SftpDirectoryClient {
    /// Opens a session that only prints the working directory.
    fn authenticate(&mut self) -> Result<()> {
        self.launcher.run_script("auth", "pwd\nquit\n")
    }

    /// Create every directory on the way to `path`, resolved against the
    /// system root like the transfer batches.
    fn mkdirs(&mut self, path: &str) -> Result<()> {
        let resolved = self.resolve_path(path)?;
        let mut script = String::new();
        let mut prefix = String::new();
        for part in resolved.split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() || resolved.starts_with('/') {
                prefix.push('/');
            }
            prefix.push_str(part);
            // "-" prefix: an existing directory is not an error
            script.push_str(&format!("-mkdir {prefix}\n"));
        }
        script.push_str("quit\n");
        self.launcher.run_script("mkdirs", &script)
    }

    fn put(&mut self, _local: &Path, _remote: &str) -> Result<()> {
        Err(Self::unsupported("put"))
    }

    fn get(&mut self, _remote: &str, _local: &Path) -> Result<()> {
        Err(Self::unsupported("get"))
    }

    fn input_stream(&mut self, _remote: &str) -> Result<Box<dyn Read>> {
        Err(Self::unsupported("input streams"))
    }

    fn output_stream(&mut self, _remote: &str) -> Result<Box<dyn Write>> {
        Err(Self::unsupported("output streams"))
    }

    /// Remove the files directly inside `remote` and then the directory.
    fn delete(&mut self, remote: &str) -> Result<()> {
        let remote = self.resolve_path(remote)?;
        let script = format!("-rm {remote}/*\nrmdir {remote}\nquit\n");
        self.launcher.run_script("delete", &script)
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Relative paths are resolved against the system root when one is set,
    /// otherwise `sftp` resolves them against the login directory.
    fn resolve_path(&self, remote: &str) -> Result<String> {
        let endpoint = &self.launcher.endpoint;
        Ok(match endpoint.root_dir.as_deref() {
            Some(root) if !remote.starts_with('/') => {
                format!("{}/{remote}", root.trim_end_matches('/'))
            }
            _ => remote.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_batch_script() {
        let script = batch_script_upload(Path::new("/home/u"), "sftp-file", "/data/u/speedtest-1");
        assert_eq!(
            script,
            "lcd /home/u\nput sftp-file /data/u/speedtest-1/sftp-file\nquit\n"
        );
    }

    #[test]
    fn test_download_batch_script() {
        let script =
            batch_script_download(Path::new("/home/u/sftp-file"), "sftp-file", "/data/u/speedtest-1");
        assert_eq!(
            script,
            "lcd /home/u\nget /data/u/speedtest-1/sftp-file /home/u/sftp-file\nquit\n"
        );
    }
}
