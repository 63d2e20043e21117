//! speedtest - remote storage upload/download benchmark.

use std::error::Error;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use speedtest_bench::{
    bench::{
        BenchmarkHarness, LibraryStrategy, NativeOptions, NativeStrategy, TransferStrategy,
        authenticate_session,
    },
    cli::{Cli, Command},
    config::BenchmarkConfiguration,
    process::SystemProcessRunner,
    results::BenchmarkReport,
};
use speedtest_core::client::{ClientFactory, DefaultClientFactory, RemoteDataClient};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the flag-derived level
    let default_level = if cli.debug() {
        "debug"
    } else if cli.verbose() {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Command::Library(args) => {
            let config = args.into_config();
            run_library(config)
        }
        Command::Native(args) => {
            let config = args.into_config();
            run_native(config)
        }
        Command::Seal(args) => {
            println!("{}", args.execute()?);
            Ok(())
        }
    }
}

fn run_library(config: BenchmarkConfiguration) -> Result<()> {
    config.validate().context("Invalid benchmark configuration")?;
    print_banner(&config, "library");

    let session = authenticate_session(&config).context("Failed to authenticate")?;
    let client = DefaultClientFactory
        .create(&session)
        .context("Failed to create data client")?;
    let strategy = LibraryStrategy::new(config.mode, config.buffer_size);
    run_harness(config, session, client, Box::new(strategy))
}

fn run_native(config: BenchmarkConfiguration) -> Result<()> {
    config.validate().context("Invalid benchmark configuration")?;
    print_banner(&config, "native");

    let session = authenticate_session(&config).context("Failed to authenticate")?;
    let strategy = NativeStrategy::new(
        &session.endpoint,
        Arc::new(SystemProcessRunner),
        NativeOptions::default(),
    )
    .context("Failed to prepare native sftp transfer")?;
    let client: Box<dyn RemoteDataClient> = Box::new(strategy.directory_client());
    run_harness(config, session, client, Box::new(strategy))
}

fn run_harness(
    config: BenchmarkConfiguration,
    session: speedtest_core::Session,
    client: Box<dyn RemoteDataClient>,
    strategy: Box<dyn TransferStrategy>,
) -> Result<()> {
    let harness = BenchmarkHarness::new(config, session, client, strategy)?;
    let mut report = harness.run().context("Benchmark setup failed")?;

    if let Some(failure) = report.failure.take_if(|f| f.is_setup_failure()) {
        return Err(failure).context("Benchmark setup failed");
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &BenchmarkReport) {
    print!("{}", report.render_table());

    if let Some(failure) = &report.failure {
        eprintln!("Benchmark failed: {failure}");
        let mut source = failure.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
    }
    for outcome in report.failed_cleanup_steps() {
        if let Some(error) = &outcome.error {
            eprintln!("Cleanup step '{}' failed: {error}", outcome.step);
        }
    }
}

/// Print a compact one-line banner when running verbosely.
fn print_banner(config: &BenchmarkConfiguration, strategy: &str) {
    use owo_colors::OwoColorize;

    if !config.is_verbose() {
        return;
    }
    let system = config.system_id.as_deref().unwrap_or("default storage system");
    let summary = format!(
        "{system} ({strategy}, {}) - {} x {} iterations",
        config.mode, config.file_size, config.iterations
    );

    println!();
    if config.color {
        println!("{}: {summary}", "speedtest".cyan().bold());
    } else {
        println!("speedtest: {summary}");
    }
    println!();
}
