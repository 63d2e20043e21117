//! Error types for the speedtest crates.
//!
//! [`SpeedtestError`] is the single taxonomy surfaced to callers. Setup
//! failures (size parsing, configuration, authentication, credential
//! materialization) abort a run before any transfer; transfer-phase failures
//! are recorded on the report so cleanup still runs.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::crypto::CryptoError;

/// Boxed error used as the `source` of wrapped failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a native transfer subprocess was considered failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeFailureCause {
    /// The process exited with a non-zero status (`None` when killed by a signal).
    ExitStatus(Option<i32>),
    /// The watchdog expired and the process was killed.
    Timeout(Duration),
    /// The process could not be started or waited on.
    Spawn(String),
}

impl fmt::Display for NativeFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExitStatus(Some(code)) => write!(f, "exit status {code}"),
            Self::ExitStatus(None) => write!(f, "terminated by signal"),
            Self::Timeout(limit) => write!(f, "watchdog timeout after {}s", limit.as_secs()),
            Self::Spawn(reason) => write!(f, "failed to start: {reason}"),
        }
    }
}

/// Errors raised by the benchmark harness and its collaborators.
#[derive(Error, Debug)]
pub enum SpeedtestError {
    /// The human-readable size could not be parsed.
    #[error("Invalid size format: {input:?} (expected <number><B|KB|MB|GB|TB|PB|XB>)")]
    InvalidSizeFormat { input: String },

    /// An existing test file does not match the requested size.
    #[error(
        "Test file {} does not match the given test file size (expected {expected} bytes, found {actual})",
        path.display()
    )]
    TestFileSizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Caller identity, tenant or endpoint could not be established.
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Ephemeral credential material could not be decrypted or written.
    #[error("Failed to materialize credentials: {reason}")]
    CredentialMaterialization {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The native transfer client failed.
    #[error("Native transfer failed ({cause}): {command}\n{output}")]
    NativeTransferFailed {
        command: String,
        output: String,
        cause: NativeFailureCause,
    },

    /// A library-mediated transfer operation failed.
    #[error("Remote transfer error: {reason}")]
    RemoteTransfer {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The benchmark configuration is not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Local filesystem error outside the categories above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpeedtestError {
    /// Authentication failure without an underlying cause.
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
            source: None,
        }
    }

    /// Authentication failure wrapping an underlying cause.
    pub fn auth_with(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::AuthenticationFailed {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Credential materialization failure wrapping an underlying cause.
    pub fn credential(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::CredentialMaterialization {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Remote transfer failure without an underlying cause.
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::RemoteTransfer {
            reason: reason.into(),
            source: None,
        }
    }

    /// Remote transfer failure wrapping an underlying cause.
    pub fn remote_with(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::RemoteTransfer {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }

    /// Whether this error belongs to the setup phase (aborts before transfers).
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidSizeFormat { .. }
                | Self::TestFileSizeMismatch { .. }
                | Self::AuthenticationFailed { .. }
                | Self::CredentialMaterialization { .. }
                | Self::InvalidConfiguration(_)
        )
    }
}

impl From<CryptoError> for SpeedtestError {
    fn from(err: CryptoError) -> Self {
        Self::credential("could not decrypt credential material", err)
    }
}

/// Result alias used across the speedtest crates.
pub type Result<T, E = SpeedtestError> = std::result::Result<T, E>;
