//! Credential cache, registry and sealed secrets working together.

use std::fs;

use secrecy::ExposeSecret;
use speedtest_core::auth::{self, AuthContext};
use speedtest_core::client::{ClientFactory, DefaultClientFactory, RemoteDataClient};
use speedtest_core::crypto::SealedSecret;
use speedtest_core::endpoint::{CredentialKind, CredentialSet, EndpointDescriptor, Protocol, salt_for};
use speedtest_core::registry::{JsonSystemRegistry, REGISTRY_FILE_NAME, SystemRegistry};
use speedtest_core::SpeedtestError;
use tempfile::TempDir;

fn sftp_endpoint(id: &str, default: bool) -> EndpointDescriptor {
    let salt = salt_for(id, "sftp.example.org", "remote");
    EndpointDescriptor {
        id: id.to_string(),
        host: "sftp.example.org".to_string(),
        port: 22,
        protocol: Protocol::Sftp,
        root_dir: None,
        default,
        credential: CredentialSet {
            kind: CredentialKind::Password,
            username: "remote".to_string(),
            password: Some(SealedSecret::seal("s3cret", &salt).unwrap()),
            public_key: None,
            private_key: None,
        },
    }
}

#[test]
fn test_registry_round_trip_keeps_sealed_secrets_usable() {
    let registry = JsonSystemRegistry::with_systems(
        ["tenant".to_string()],
        [sftp_endpoint("primary", true), sftp_endpoint("secondary", false)],
    );
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(REGISTRY_FILE_NAME);
    fs::write(&path, registry.to_json().unwrap()).unwrap();

    let loaded = JsonSystemRegistry::load(&path).unwrap();
    let endpoint = loaded.find_system("secondary", "anyone").unwrap().unwrap();
    let password = endpoint
        .credential
        .open_password(&endpoint.credential_salt())
        .unwrap()
        .unwrap();
    assert_eq!(password.expose_secret(), "s3cret");

    // A different system id is a different salt.
    let wrong = endpoint.credential.open_password(&salt_for("primary", "sftp.example.org", "remote"));
    assert!(wrong.is_err());
}

#[test]
fn test_cache_and_registry_resolve_default_system() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(auth::CREDENTIAL_CACHE_FILE),
        r#"{"username":"alice","tenantid":"tenant","access_token":"ignored"}"#,
    )
    .unwrap();
    let registry = JsonSystemRegistry::with_systems(
        ["tenant".to_string()],
        [sftp_endpoint("secondary", false), sftp_endpoint("primary", true)],
    );

    let context = AuthContext::load(dir.path()).unwrap();
    let session = auth::authenticate(&context, &registry, None).unwrap();
    assert_eq!(session.username, "alice");
    assert_eq!(session.endpoint.id, "primary");

    let explicit = auth::authenticate(&context, &registry, Some("secondary")).unwrap();
    assert_eq!(explicit.endpoint.id, "secondary");
}

#[test]
fn test_unknown_tenant_is_rejected() {
    let registry = JsonSystemRegistry::with_systems(["other".to_string()], [sftp_endpoint("primary", true)]);
    let context = AuthContext::from_json(r#"{"username":"alice","tenantid":"tenant"}"#).unwrap();
    let err = auth::authenticate(&context, &registry, None).unwrap_err();
    assert!(matches!(err, SpeedtestError::AuthenticationFailed { .. }));
    assert!(err.is_setup_failure());
}

#[test]
fn test_factory_builds_local_client_for_local_systems() {
    let root = TempDir::new().unwrap();
    let mut endpoint = sftp_endpoint("scratch", true);
    endpoint.protocol = Protocol::Local;
    endpoint.root_dir = Some(root.path().to_string_lossy().into_owned());
    let registry = JsonSystemRegistry::with_systems(["tenant".to_string()], [endpoint]);
    let context = AuthContext::from_json(r#"{"username":"alice","tenantid":"tenant"}"#).unwrap();
    let session = auth::authenticate(&context, &registry, Some("scratch")).unwrap();

    let mut client = DefaultClientFactory.create(&session).unwrap();
    client.authenticate().unwrap();
    client.mkdirs("alice/run").unwrap();
    assert!(root.path().join("alice/run").is_dir());
    client.delete("alice/run").unwrap();
    assert!(!root.path().join("alice/run").exists());
    client.disconnect().unwrap();

    let mut sftp = sftp_endpoint("remote", true);
    sftp.protocol = Protocol::S3;
    let session = speedtest_core::Session {
        endpoint: sftp,
        ..session
    };
    assert!(DefaultClientFactory.create(&session).is_err());
}
