//! Remote endpoint descriptors as stored in the system registry.

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::crypto::SealedSecret;
use crate::error::Result;

/// Transfer protocol spoken by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Sftp,
    Gridftp,
    S3,
    /// A directory on the local filesystem.
    Local,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sftp => "sftp",
            Self::Gridftp => "gridftp",
            Self::S3 => "s3",
            Self::Local => "local",
        };
        f.write_str(name)
    }
}

/// How the default credential authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    #[serde(rename = "password")]
    Password,
    #[serde(rename = "ssh-keys")]
    SshKeys,
}

/// Default credential of an endpoint. Secrets stay sealed until opened with
/// the endpoint salt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub username: String,
    /// Login password, or the private key passphrase for `ssh-keys`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SealedSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<SealedSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<SealedSecret>,
}

impl CredentialSet {
    /// Open the password (or key passphrase), if one is stored.
    pub fn open_password(&self, salt: &str) -> Result<Option<SecretString>> {
        open_optional(self.password.as_ref(), salt)
    }

    pub fn open_public_key(&self, salt: &str) -> Result<Option<SecretString>> {
        open_optional(self.public_key.as_ref(), salt)
    }

    pub fn open_private_key(&self, salt: &str) -> Result<Option<SecretString>> {
        open_optional(self.private_key.as_ref(), salt)
    }
}

fn open_optional(sealed: Option<&SealedSecret>, salt: &str) -> Result<Option<SecretString>> {
    sealed.map(|s| s.open(salt)).transpose().map_err(Into::into)
}

/// A remote storage endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<String>,
    /// Whether this is the default storage system for its users.
    #[serde(default)]
    pub default: bool,
    pub credential: CredentialSet,
}

impl EndpointDescriptor {
    /// Salt under which this endpoint's secrets are sealed.
    pub fn credential_salt(&self) -> String {
        salt_for(&self.id, &self.host, &self.credential.username)
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }
}

/// Build the credential salt from its parts (`system_id + host + username`).
pub fn salt_for(system_id: &str, host: &str, username: &str) -> String {
    format!("{system_id}{host}{username}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn descriptor_json() -> &'static str {
        r#"{
            "id": "sftp.example.org",
            "host": "sftp.example.org",
            "port": 22,
            "protocol": "sftp",
            "credential": { "type": "password", "username": "testuser" }
        }"#
    }

    #[test]
    fn test_salt_concatenates_identity() {
        let endpoint: EndpointDescriptor = serde_json::from_str(descriptor_json()).unwrap();
        assert_eq!(
            endpoint.credential_salt(),
            "sftp.example.orgsftp.example.orgtestuser"
        );
        assert_eq!(endpoint.protocol, Protocol::Sftp);
        assert!(!endpoint.default);
        assert!(endpoint.root_dir.is_none());
    }

    #[test]
    fn test_open_password_with_endpoint_salt() {
        let mut endpoint: EndpointDescriptor = serde_json::from_str(descriptor_json()).unwrap();
        let salt = endpoint.credential_salt();
        endpoint.credential.password = Some(SealedSecret::seal("s3cret", &salt).unwrap());

        let opened = endpoint.credential.open_password(&salt).unwrap().unwrap();
        assert_eq!(opened.expose_secret(), "s3cret");
        assert!(endpoint.credential.open_private_key(&salt).unwrap().is_none());
    }

    #[test]
    fn test_credential_kind_wire_names() {
        let kind: CredentialKind = serde_json::from_str(r#""ssh-keys""#).unwrap();
        assert_eq!(kind, CredentialKind::SshKeys);
        assert_eq!(Protocol::Gridftp.to_string(), "gridftp");
    }
}
