//! Orchestration of one benchmark run.
//!
//! ```text
//! Idle -> Authenticated -> DirectoryPrepared -> (Uploading <-> Downloading) x N
//!      -> Reporting -> CleanedUp
//! ```
//!
//! Setup failures (configuration, provisioning) return `Err` before anything
//! remote is touched. Failures after that are recorded on the
//! [`BenchmarkReport`] and cleanup still runs.

use std::time::Instant;

use speedtest_core::auth::{self, AuthContext, Session};
use speedtest_core::client::RemoteDataClient;
use speedtest_core::error::Result;
use speedtest_core::registry::{JsonSystemRegistry, REGISTRY_FILE_NAME, SystemRegistry};
use tracing::{debug, info, warn};

use super::{TransferContext, TransferStrategy};
use crate::cleanup::CleanupReport;
use crate::config::{BenchmarkConfiguration, TransferMode};
use crate::provision::{self, TestFile};
use crate::results::{BenchmarkReport, TransferTiming, bytes_per_second, format_throughput};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    Idle,
    Authenticated,
    DirectoryPrepared,
    Uploading,
    Downloading,
    Reporting,
    CleanedUp,
}

fn transition(state: &mut HarnessState, next: HarnessState) {
    debug!(from = ?state, to = ?next, "Harness state change");
    *state = next;
}

/// Load the caller identity and resolve the target endpoint.
///
/// The registry is read from `systems.json` in the same cache directory as
/// the credential cache.
pub fn authenticate_session(config: &BenchmarkConfiguration) -> Result<Session> {
    let cache_dir = auth::cache_dir_from_env(config.cache_dir.as_deref())?;
    debug!(cache_dir = %cache_dir.display(), "Resolved credential cache directory");
    let context = AuthContext::load(&cache_dir)?;
    let registry = JsonSystemRegistry::load(&cache_dir.join(REGISTRY_FILE_NAME))?;
    authenticate_with(&context, &registry, config)
}

/// [`authenticate_session`] against an explicit context and registry.
pub fn authenticate_with(
    context: &AuthContext,
    registry: &dyn SystemRegistry,
    config: &BenchmarkConfiguration,
) -> Result<Session> {
    let session = auth::authenticate(context, registry, config.system_id.as_deref())?;
    debug!(from = ?HarnessState::Idle, to = ?HarnessState::Authenticated, "Harness state change");
    Ok(session)
}

/// Runs the configured number of iterations through one strategy.
pub struct BenchmarkHarness {
    config: BenchmarkConfiguration,
    session: Session,
    client: Box<dyn RemoteDataClient>,
    strategy: Box<dyn TransferStrategy>,
    state: HarnessState,
}

impl BenchmarkHarness {
    /// Build a harness. The configuration is validated here and never
    /// changes afterwards.
    pub fn new(
        config: BenchmarkConfiguration,
        session: Session,
        client: Box<dyn RemoteDataClient>,
        strategy: Box<dyn TransferStrategy>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session,
            client,
            strategy,
            state: HarnessState::Authenticated,
        })
    }

    pub fn config(&self) -> &BenchmarkConfiguration {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Provision test data, run every iteration, then clean up.
    ///
    /// Returns `Err` only for setup failures; transfer-phase failures are on
    /// the report.
    pub fn run(mut self) -> Result<BenchmarkReport> {
        let test_file = provision::provision(
            self.config.file_path.as_deref(),
            &self.config.file_size,
            self.config.mode == TransferMode::InMemory,
        )?;
        let remote_dir = format!("{}/speedtest-{}", self.session.username, uuid::Uuid::new_v4());
        info!(
            strategy = self.strategy.name(),
            mode = %self.config.mode,
            remote_dir = %remote_dir,
            length = test_file.length(),
            "Starting benchmark"
        );

        let mut report = BenchmarkReport::default();
        let mut completed = None;
        if let Err(e) = self.execute(&test_file, &remote_dir, &mut completed) {
            warn!(error = %e, "Benchmark aborted");
            report.failure = Some(e);
        }

        transition(&mut self.state, HarnessState::Reporting);
        if let Some(timing) = completed {
            report.rows.push(timing.result());
        }

        report.cleanup = self.cleanup(&test_file, &remote_dir);
        transition(&mut self.state, HarnessState::CleanedUp);
        Ok(report)
    }

    fn execute(
        &mut self,
        test_file: &TestFile,
        remote_dir: &str,
        completed: &mut Option<TransferTiming>,
    ) -> Result<()> {
        let verbose = self.config.is_verbose();
        let endpoint = &self.session.endpoint;

        if verbose {
            println!(
                "Authenticating to {}@{}:{}",
                endpoint.username(),
                endpoint.host,
                endpoint.port
            );
            println!("Test file size: {}", test_file.length());
        }
        self.client.authenticate()?;

        if let Err(e) = self.client.mkdirs(remote_dir) {
            warn!(remote_dir, error = %e, "Could not create remote working directory");
        }
        let remote_dir_abs = self.client.resolve_path(remote_dir).unwrap_or_else(|e| {
            warn!(remote_dir, error = %e, "Could not resolve remote working directory");
            remote_dir.to_string()
        });
        transition(&mut self.state, HarnessState::DirectoryPrepared);

        let ctx = TransferContext {
            config: &self.config,
            session: &self.session,
            test_file,
            remote_dir,
            remote_dir_abs: &remote_dir_abs,
        };
        self.strategy.prepare(&ctx)?;

        let length = test_file.length();
        for iteration in 0..self.config.iterations {
            debug!(iteration, "Starting iteration");
            let mut timing = TransferTiming::new(length);

            if self.config.upload {
                transition(&mut self.state, HarnessState::Uploading);
                if verbose {
                    println!("Starting upload test...");
                    println!(
                        "\tTransfer: {} => {}/{}",
                        test_file.path().display(),
                        ctx.session.endpoint.id,
                        ctx.remote_file()
                    );
                }
                timing.upload_start = Some(Instant::now());
                let outcome = self.strategy.run_upload(self.client.as_mut(), &ctx);
                timing.upload_end = Some(Instant::now());
                outcome?;
                if verbose {
                    print_perf(length, &timing, Direction::Upload);
                }
            }

            if self.config.download {
                transition(&mut self.state, HarnessState::Downloading);
                if verbose {
                    println!("Starting download test...");
                    println!(
                        "\tTransfer: {}/{} => {}",
                        ctx.session.endpoint.id,
                        ctx.remote_file(),
                        test_file.path().display()
                    );
                }
                timing.download_start = Some(Instant::now());
                let outcome = self.strategy.run_download(self.client.as_mut(), &ctx);
                timing.download_end = Some(Instant::now());
                outcome?;
                if verbose {
                    print_perf(length, &timing, Direction::Download);
                }
            }

            *completed = Some(timing);
        }
        Ok(())
    }

    fn cleanup(&mut self, test_file: &TestFile, remote_dir: &str) -> Vec<crate::results::CleanupOutcome> {
        let verbose = self.config.is_verbose();
        let mut report = CleanupReport::new();

        if verbose {
            println!("Cleaning up remote directory");
        }
        report.step("delete remote working directory", || self.client.delete(remote_dir));
        report.step("disconnect client", || self.client.disconnect());
        report.step("release transfer strategy", || self.strategy.release());
        report.step("remove generated test file", || {
            let removed = test_file.remove_if_generated()?;
            if removed && verbose {
                println!("Cleaning up local test file");
            }
            Ok::<_, std::io::Error>(())
        });

        report.into_outcomes()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Upload,
    Download,
}

fn print_perf(length: u64, timing: &TransferTiming, direction: Direction) {
    let elapsed = match direction {
        Direction::Upload => timing.upload_elapsed(),
        Direction::Download => timing.download_elapsed(),
    };
    println!(
        "\tPerf: {}ms {}",
        elapsed.as_millis(),
        format_throughput(bytes_per_second(length, elapsed))
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_with_marks_session() {
        let registry = JsonSystemRegistry::from_json(
            r#"{"tenants":["t"],"systems":[{"id":"s","host":"h","port":22,"protocol":"local",
                "default":true,"credential":{"type":"password","username":"u"}}]}"#,
        )
        .unwrap();
        let context = AuthContext {
            username: "u".to_string(),
            tenant_id: "t".to_string(),
        };
        let session = authenticate_with(&context, &registry, &BenchmarkConfiguration::new()).unwrap();
        assert_eq!(session.endpoint.id, "s");
    }

    #[test]
    fn test_authenticate_session_reads_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("current"),
            r#"{"username":"u","tenantid":"t"}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(REGISTRY_FILE_NAME),
            r#"{"tenants":["t"],"systems":[{"id":"s","host":"h","port":22,"protocol":"local",
                "credential":{"type":"password","username":"u"}}]}"#,
        )
        .unwrap();

        let mut config = BenchmarkConfiguration::new();
        config.system_id = Some("s".to_string());
        config.cache_dir = Some(dir.path().to_path_buf());
        // AGAVE_CACHE_DIR wins over the option; only assert when it is unset.
        if std::env::var_os(auth::CACHE_DIR_ENV).is_none() {
            let session = authenticate_session(&config).unwrap();
            assert_eq!(session.username, "u");
        }
    }
}
