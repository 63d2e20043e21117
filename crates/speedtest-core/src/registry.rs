//! Lookup of tenants and remote systems.
//!
//! [`SystemRegistry`] is the seam to whatever service knows about endpoints.
//! [`JsonSystemRegistry`] reads a `systems.json` document:
//!
//! ```json
//! {
//!   "tenants": ["agave.prod"],
//!   "systems": [
//!     { "id": "data.example.org", "host": "data.example.org", "port": 22,
//!       "protocol": "sftp", "default": true, "users": ["testuser"],
//!       "credential": { "type": "password", "username": "testuser",
//!                       "password": { "nonce": "...", "ciphertext": "..." } } }
//!   ]
//! }
//! ```
//!
//! A system with an empty `users` list is visible to every user.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::endpoint::EndpointDescriptor;
use crate::error::{Result, SpeedtestError};

/// File name of the registry inside the cache directory.
pub const REGISTRY_FILE_NAME: &str = "systems.json";

/// Read access to tenants and endpoints.
pub trait SystemRegistry {
    fn tenant_exists(&self, tenant_id: &str) -> Result<bool>;

    /// Find a system by id among those visible to `username`.
    fn find_system(&self, system_id: &str, username: &str) -> Result<Option<EndpointDescriptor>>;

    /// The user's default storage system, if one is registered.
    fn default_storage_system(&self, username: &str) -> Result<Option<EndpointDescriptor>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryEntry {
    #[serde(flatten)]
    endpoint: EndpointDescriptor,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    users: Vec<String>,
}

impl RegistryEntry {
    fn visible_to(&self, username: &str) -> bool {
        self.users.is_empty() || self.users.iter().any(|u| u == username)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    tenants: Vec<String>,
    #[serde(default)]
    systems: Vec<RegistryEntry>,
}

/// Registry backed by a JSON document loaded once.
#[derive(Debug, Clone, Default)]
pub struct JsonSystemRegistry {
    document: RegistryDocument,
}

impl JsonSystemRegistry {
    /// Load the registry from `path`.
    ///
    /// A missing or malformed file is an authentication failure: without it
    /// no endpoint can be resolved.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SpeedtestError::auth_with(
                format!("cannot read system registry {}", path.display()),
                e,
            )
        })?;
        let registry = Self::from_json(&contents).map_err(|e| match e {
            SpeedtestError::AuthenticationFailed { source, .. } => {
                SpeedtestError::AuthenticationFailed {
                    reason: format!("malformed system registry {}", path.display()),
                    source,
                }
            }
            other => other,
        })?;
        debug!(
            path = %path.display(),
            systems = registry.document.systems.len(),
            "Loaded system registry"
        );
        Ok(registry)
    }

    /// Parse a registry document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let document = serde_json::from_str(contents)
            .map_err(|e| SpeedtestError::auth_with("malformed system registry", e))?;
        Ok(Self { document })
    }

    /// Registry containing exactly the given tenant and endpoints.
    pub fn with_systems(
        tenants: impl IntoIterator<Item = String>,
        systems: impl IntoIterator<Item = EndpointDescriptor>,
    ) -> Self {
        Self {
            document: RegistryDocument {
                tenants: tenants.into_iter().collect(),
                systems: systems
                    .into_iter()
                    .map(|endpoint| RegistryEntry {
                        endpoint,
                        users: Vec::new(),
                    })
                    .collect(),
            },
        }
    }

    /// Serialize the registry back to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.document)
            .map_err(|e| SpeedtestError::InvalidConfiguration(e.to_string()))
    }
}

impl SystemRegistry for JsonSystemRegistry {
    fn tenant_exists(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.document.tenants.iter().any(|t| t == tenant_id))
    }

    fn find_system(&self, system_id: &str, username: &str) -> Result<Option<EndpointDescriptor>> {
        Ok(self
            .document
            .systems
            .iter()
            .find(|e| e.endpoint.id == system_id && e.visible_to(username))
            .map(|e| e.endpoint.clone()))
    }

    fn default_storage_system(&self, username: &str) -> Result<Option<EndpointDescriptor>> {
        Ok(self
            .document
            .systems
            .iter()
            .find(|e| e.endpoint.default && e.visible_to(username))
            .map(|e| e.endpoint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "tenants": ["agave.prod"],
        "systems": [
            { "id": "private.example.org", "host": "10.0.0.1", "port": 2222,
              "protocol": "sftp", "users": ["alice"],
              "credential": { "type": "password", "username": "alice" } },
            { "id": "shared.example.org", "host": "shared.example.org", "port": 22,
              "protocol": "local", "root_dir": "/srv/data", "default": true,
              "credential": { "type": "password", "username": "svc" } }
        ]
    }"#;

    #[test]
    fn test_tenant_lookup() {
        let registry = JsonSystemRegistry::from_json(DOCUMENT).unwrap();
        assert!(registry.tenant_exists("agave.prod").unwrap());
        assert!(!registry.tenant_exists("other").unwrap());
    }

    #[test]
    fn test_find_system_respects_users() {
        let registry = JsonSystemRegistry::from_json(DOCUMENT).unwrap();
        let found = registry.find_system("private.example.org", "alice").unwrap();
        assert_eq!(found.unwrap().port, 2222);
        assert!(registry.find_system("private.example.org", "bob").unwrap().is_none());
        assert!(registry.find_system("missing", "alice").unwrap().is_none());
    }

    #[test]
    fn test_default_storage_system() {
        let registry = JsonSystemRegistry::from_json(DOCUMENT).unwrap();
        let default = registry.default_storage_system("bob").unwrap().unwrap();
        assert_eq!(default.id, "shared.example.org");
        assert_eq!(default.root_dir.as_deref(), Some("/srv/data"));
    }

    #[test]
    fn test_malformed_document_is_auth_failure() {
        let err = JsonSystemRegistry::from_json("{ not json").unwrap_err();
        assert!(matches!(err, SpeedtestError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonSystemRegistry::load(&dir.path().join(REGISTRY_FILE_NAME)).unwrap_err();
        assert!(err.to_string().contains("cannot read system registry"));
    }
}
