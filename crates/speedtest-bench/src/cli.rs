//! Command-line interface for the speedtest.

use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use speedtest_core::crypto::SealedSecret;
use speedtest_core::endpoint::salt_for;
use speedtest_core::size::parse_byte_count;
use zeroize::Zeroizing;

use crate::config::{BenchmarkConfiguration, DEFAULT_FILE_SIZE, TransferMode};

/// Upload/download throughput benchmark against remote storage systems.
///
/// Results are printed as a fixed-width table: file size, upload time and
/// rate, download time and rate (rates in KB/s).
#[derive(Parser, Debug)]
#[command(name = "speedtest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Benchmark through the data client (normal, streaming or in-memory).
    Library(LibraryArgs),
    /// Benchmark by running the system's native sftp client.
    Native(NativeArgs),
    /// Seal a secret for use in the system registry.
    Seal(SealArgs),
}

impl Cli {
    /// Whether `--verbose` was given to a benchmark subcommand.
    pub fn verbose(&self) -> bool {
        self.common().is_some_and(|c| c.verbose)
    }

    /// Whether `--debug` was given to a benchmark subcommand.
    pub fn debug(&self) -> bool {
        self.common().is_some_and(|c| c.debug)
    }

    fn common(&self) -> Option<&CommonArgs> {
        match &self.command {
            Command::Library(args) => Some(&args.common),
            Command::Native(args) => Some(&args.common),
            Command::Seal(_) => None,
        }
    }
}

/// Options shared by both benchmark subcommands.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// System to benchmark. Defaults to your default storage system.
    #[arg(short = 's', long, value_name = "SYSTEM_ID")]
    pub system: Option<String>,

    /// Local test file. Defaults to $HOME/sftp-file, generated if missing.
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Test file size, e.g. 512KB, 2MB, 1.5GB.
    #[arg(long, default_value = DEFAULT_FILE_SIZE)]
    pub size: String,

    /// Number of upload/download iterations.
    #[arg(long = "iter", value_name = "N", default_value_t = 1)]
    pub iterations: usize,

    /// Print per-phase progress and per-iteration throughput.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Debug logging (implies --verbose).
    #[arg(long)]
    pub debug: bool,

    /// Directory holding the credential cache and system registry.
    ///
    /// AGAVE_CACHE_DIR takes precedence; $HOME/.agave is the fallback.
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,
}

impl CommonArgs {
    fn base_config(&self) -> BenchmarkConfiguration {
        let mut config = BenchmarkConfiguration::new();
        config.system_id.clone_from(&self.system);
        config.file_path.clone_from(&self.file);
        config.file_size.clone_from(&self.size);
        config.iterations = self.iterations;
        config.verbose = self.verbose;
        config.debug = self.debug;
        config.cache_dir.clone_from(&self.cache_dir);
        config.color = !self.no_color && supports_color();
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct LibraryArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Include the upload test.
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub upload: bool,

    /// Include the download test.
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub download: bool,

    /// Copy through client streams with a manual read/write loop.
    #[arg(long)]
    pub streaming: bool,

    /// Stream the zero device to the remote null device; no local file.
    #[arg(long)]
    pub in_memory: bool,

    /// Buffer size in bytes (or a size such as 64KB).
    #[arg(long, value_name = "BYTES", default_value = "32768", value_parser = parse_buffer_size)]
    pub buffer_size: usize,
}

impl LibraryArgs {
    pub fn into_config(self) -> BenchmarkConfiguration {
        let mut config = self.common.base_config();
        config.upload = self.upload;
        config.download = self.download;
        config.mode = TransferMode::from_flags(self.streaming, self.in_memory);
        config.buffer_size = self.buffer_size;
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct NativeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Include the upload test ("true" enables, anything else disables).
    #[arg(long, value_name = "BOOL", default_value = "true")]
    pub upload: String,

    /// Include the download test ("true" enables, anything else disables).
    #[arg(long, value_name = "BOOL", default_value = "true")]
    pub download: String,
}

impl NativeArgs {
    pub fn into_config(self) -> BenchmarkConfiguration {
        let mut config = self.common.base_config();
        config.upload = lenient_bool(&self.upload);
        config.download = lenient_bool(&self.download);
        config
    }
}

#[derive(Args, Debug, Clone)]
pub struct SealArgs {
    /// Registry id of the system the secret belongs to.
    #[arg(long, value_name = "SYSTEM_ID")]
    pub system_id: String,

    /// Host of the system.
    #[arg(long)]
    pub host: String,

    /// Username of the system credential.
    #[arg(long)]
    pub username: String,

    /// Read the secret from stdin instead of prompting.
    #[arg(long)]
    pub stdin: bool,
}

impl SealArgs {
    /// Read the secret and return the sealed JSON.
    pub fn execute(&self) -> Result<String> {
        let secret = if self.stdin || !std::io::stdin().is_terminal() {
            let mut buf = Zeroizing::new(String::new());
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read secret from stdin")?;
            let trimmed = buf.trim_end_matches(['\r', '\n']).len();
            buf.truncate(trimmed);
            buf
        } else {
            Zeroizing::new(rpassword::prompt_password("Secret: ").context("Failed to read secret")?)
        };
        if secret.is_empty() {
            bail!("Refusing to seal an empty secret");
        }

        let salt = salt_for(&self.system_id, &self.host, &self.username);
        let sealed = SealedSecret::seal(&secret, &salt).context("Failed to seal secret")?;
        serde_json::to_string_pretty(&sealed).context("Failed to serialize sealed secret")
    }
}

/// "true" in any case is true; anything else is false.
pub fn lenient_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn parse_buffer_size(value: &str) -> std::result::Result<usize, String> {
    let bytes = parse_byte_count(value).map_err(|e| e.to_string())?;
    let bytes = usize::try_from(bytes).map_err(|_| format!("buffer size too large: {value}"))?;
    if bytes == 0 {
        return Err("buffer size must be greater than zero".to_string());
    }
    Ok(bytes)
}

/// Check if the terminal supports color.
fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err() && std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_defaults() {
        let cli = Cli::try_parse_from(["speedtest", "library"]).unwrap();
        let Command::Library(args) = cli.command else {
            panic!("expected library command");
        };
        let config = args.into_config();
        assert!(config.upload && config.download);
        assert_eq!(config.file_size, "2MB");
        assert_eq!(config.iterations, 1);
        assert_eq!(config.buffer_size, 32768);
        assert_eq!(config.mode, TransferMode::Normal);
    }

    #[test]
    fn test_library_options() {
        let cli = Cli::try_parse_from([
            "speedtest", "library", "--system", "sys", "--upload", "false", "--size", "4KB",
            "--iter", "3", "--in-memory", "--buffer-size", "4KB",
        ])
        .unwrap();
        let Command::Library(args) = cli.command else {
            panic!("expected library command");
        };
        let config = args.into_config();
        assert_eq!(config.system_id.as_deref(), Some("sys"));
        assert!(!config.upload);
        assert!(config.download);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.mode, TransferMode::InMemory);
        assert_eq!(config.buffer_size, 4096);
    }

    #[test]
    fn test_library_rejects_non_boolean() {
        assert!(Cli::try_parse_from(["speedtest", "library", "--upload", "maybe"]).is_err());
        assert!(Cli::try_parse_from(["speedtest", "library", "--buffer-size", "0"]).is_err());
    }

    #[test]
    fn test_native_booleans_are_lenient() {
        let cli =
            Cli::try_parse_from(["speedtest", "native", "--upload", "TRUE", "--download", "yes"]).unwrap();
        let Command::Native(args) = cli.command else {
            panic!("expected native command");
        };
        let config = args.into_config();
        assert!(config.upload);
        assert!(!config.download);
    }

    #[test]
    fn test_verbose_and_debug_flags() {
        let cli = Cli::try_parse_from(["speedtest", "native", "--debug"]).unwrap();
        assert!(cli.debug());
        assert!(!cli.verbose());
        let seal = Cli::try_parse_from([
            "speedtest", "seal", "--system-id", "s", "--host", "h", "--username", "u",
        ])
        .unwrap();
        assert!(!seal.verbose());
    }
}
