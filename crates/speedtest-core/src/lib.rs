//! Shared building blocks for the transfer speedtest: size parsing, endpoint
//! and credential model, caller authentication and the data-client seam.

pub mod auth;
pub mod client;
pub mod crypto;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod size;

pub use auth::{AuthContext, Session};
pub use client::{ClientFactory, DefaultClientFactory, LocalDataClient, RemoteDataClient};
pub use crypto::SealedSecret;
pub use endpoint::{CredentialKind, CredentialSet, EndpointDescriptor, Protocol};
pub use error::{NativeFailureCause, Result, SpeedtestError};
pub use registry::{JsonSystemRegistry, SystemRegistry};
pub use size::parse_size;
