//! Caller identity and endpoint resolution.
//!
//! The caller is identified by the credential cache file (`current`) written
//! by the platform CLI. Its `username` and `tenantid` are checked against the
//! [`SystemRegistry`] and the target endpoint is resolved into a [`Session`].

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::endpoint::EndpointDescriptor;
use crate::error::{Result, SpeedtestError};
use crate::registry::SystemRegistry;

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "AGAVE_CACHE_DIR";

/// Name of the credential cache file inside the cache directory.
pub const CREDENTIAL_CACHE_FILE: &str = "current";

/// Directory under `$HOME` used when nothing else is configured.
pub const DEFAULT_CACHE_DIR_NAME: &str = ".agave";

/// Resolve the cache directory.
///
/// Order: the `AGAVE_CACHE_DIR` value, then the explicit option, then
/// `$HOME/.agave`. Empty values are skipped.
pub fn resolve_cache_dir(env_value: Option<&str>, option: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = env_value.filter(|v| !v.trim().is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    if let Some(dir) = option.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(dir.to_path_buf());
    }
    dirs::home_dir()
        .map(|home| home.join(DEFAULT_CACHE_DIR_NAME))
        .ok_or_else(|| SpeedtestError::auth("cannot determine home directory for the credential cache"))
}

/// [`resolve_cache_dir`] reading the environment of the current process.
pub fn cache_dir_from_env(option: Option<&Path>) -> Result<PathBuf> {
    let env_value = std::env::var(CACHE_DIR_ENV).ok();
    resolve_cache_dir(env_value.as_deref(), option)
}

#[derive(Debug, Deserialize)]
struct CacheFile {
    username: Option<String>,
    tenantid: Option<String>,
}

/// Identity read from the credential cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub username: String,
    pub tenant_id: String,
}

impl AuthContext {
    /// Read `<cache_dir>/current`.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(CREDENTIAL_CACHE_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| {
            SpeedtestError::auth_with(
                format!("no credential cache found at {}", path.display()),
                e,
            )
        })?;
        Self::from_json(&contents)
    }

    /// Parse the cache file contents. Unknown fields are ignored.
    pub fn from_json(contents: &str) -> Result<Self> {
        let cache: CacheFile = serde_json::from_str(contents)
            .map_err(|e| SpeedtestError::auth_with("malformed credential cache", e))?;

        let username = cache
            .username
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SpeedtestError::auth("no username found in the credential cache"))?;
        let tenant_id = cache
            .tenantid
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| SpeedtestError::auth("no tenant id found in the credential cache"))?;

        Ok(Self {
            username,
            tenant_id,
        })
    }
}

/// An authenticated caller bound to a resolved endpoint.
#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub tenant_id: String,
    pub endpoint: EndpointDescriptor,
}

/// Check the caller's tenant and resolve the endpoint.
///
/// Without a `system_id`, the user's default storage system is used.
#[instrument(level = "debug", skip(context, registry), fields(user = %context.username))]
pub fn authenticate(
    context: &AuthContext,
    registry: &dyn SystemRegistry,
    system_id: Option<&str>,
) -> Result<Session> {
    if !registry.tenant_exists(&context.tenant_id)? {
        return Err(SpeedtestError::auth(format!(
            "invalid tenant id {}",
            context.tenant_id
        )));
    }

    let endpoint = match system_id.filter(|s| !s.is_empty()) {
        Some(id) => registry
            .find_system(id, &context.username)?
            .ok_or_else(|| SpeedtestError::auth(format!("no system found with id {id}")))?,
        None => registry
            .default_storage_system(&context.username)?
            .ok_or_else(|| {
                SpeedtestError::auth(format!(
                    "no default storage system found for {}",
                    context.username
                ))
            })?,
    };

    debug!(system = %endpoint.id, protocol = %endpoint.protocol, "Resolved endpoint");

    Ok(Session {
        username: context.username.clone(),
        tenant_id: context.tenant_id.clone(),
        endpoint,
    })
}
