//! Sealing and opening of endpoint credential material.
//!
//! Registry entries never store credentials in clear text. Each secret is
//! sealed with AES-256-GCM under a key derived with scrypt from the endpoint
//! salt (`system_id + host + username`), so a secret copied to another
//! endpoint entry no longer opens.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// scrypt cost parameter (N = 2^14).
const SCRYPT_COST_PARAM_LOG2: u8 = 14;
const SCRYPT_BLOCK_SIZE: u32 = 8;
const SCRYPT_PARALLELIZATION: u32 = 1;

/// Fixed domain separator used as the scrypt salt; the endpoint salt is the
/// scrypt password input.
const KDF_PEPPER: &[u8] = b"speedtest.credential.v1";

/// Errors that can occur while sealing or opening credential material.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Authentication tag check failed: wrong salt or tampered ciphertext.
    #[error("Credential decryption failed - wrong endpoint salt or corrupted ciphertext")]
    DecryptionFailed,

    /// Encryption failed inside the cipher.
    #[error("Credential encryption failed")]
    EncryptionFailed,

    /// scrypt rejected its parameters or output length.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The stored nonce has the wrong size.
    #[error("Invalid nonce length: expected {NONCE_LEN}, got {0}")]
    InvalidNonceLength(usize),

    /// The decrypted bytes are not valid UTF-8.
    #[error("Decrypted credential is not valid UTF-8")]
    InvalidUtf8,
}

/// An encrypted secret as stored in the system registry.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    #[serde_as(as = "Base64")]
    pub nonce: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
}

impl SealedSecret {
    /// Seal `plaintext` under the key derived from `salt`.
    pub fn seal(plaintext: &str, salt: &str) -> Result<Self, CryptoError> {
        let key = derive_key(salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        Ok(Self {
            nonce: nonce.to_vec(),
            ciphertext,
        })
    }

    /// Open the secret with the key derived from `salt`.
    pub fn open(&self, salt: &str) -> Result<SecretString, CryptoError> {
        if self.nonce.len() != NONCE_LEN {
            return Err(CryptoError::InvalidNonceLength(self.nonce.len()));
        }

        let key = derive_key(salt)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key[..]));

        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
                .map_err(|_| CryptoError::DecryptionFailed)?,
        );

        let text = std::str::from_utf8(&plaintext).map_err(|_| CryptoError::InvalidUtf8)?;
        Ok(SecretString::from(text.to_owned()))
    }
}

/// Derive the 256-bit sealing key for an endpoint salt.
fn derive_key(salt: &str) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let params = scrypt::Params::new(
        SCRYPT_COST_PARAM_LOG2,
        SCRYPT_BLOCK_SIZE,
        SCRYPT_PARALLELIZATION,
        32,
    )
    .map_err(|e| {
        CryptoError::KeyDerivationFailed(format!(
            "invalid scrypt parameters (N=2^{SCRYPT_COST_PARAM_LOG2}, r={SCRYPT_BLOCK_SIZE}, p={SCRYPT_PARALLELIZATION}): {e}"
        ))
    })?;

    let mut key = Zeroizing::new([0u8; 32]);
    scrypt::scrypt(salt.as_bytes(), KDF_PEPPER, &params, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SALT: &str = "sftp.example.orgsftp.example.orgtestuser";

    #[test]
    fn test_seal_then_open_with_same_salt() {
        let sealed = SealedSecret::seal("hunter2", SALT).unwrap();
        let opened = sealed.open(SALT).unwrap();
        assert_eq!(opened.expose_secret(), "hunter2");
    }

    #[test]
    fn test_open_with_wrong_salt_fails() {
        let sealed = SealedSecret::seal("hunter2", SALT).unwrap();
        let result = sealed.open("other.systemhostuser");
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut sealed = SealedSecret::seal("hunter2", SALT).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(sealed.open(SALT), Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_bad_nonce_length_rejected() {
        let sealed = SealedSecret {
            nonce: vec![0u8; 4],
            ciphertext: vec![0u8; 32],
        };
        assert!(matches!(
            sealed.open(SALT),
            Err(CryptoError::InvalidNonceLength(4))
        ));
    }

    #[test]
    fn test_sealed_secret_json_is_base64() {
        let sealed = SealedSecret {
            nonce: vec![0u8; NONCE_LEN],
            ciphertext: vec![0xff, 0xfe],
        };
        let json = serde_json::to_string(&sealed).unwrap();
        assert_eq!(json, r#"{"nonce":"AAAAAAAAAAAAAAAA","ciphertext":"//4="}"#);
        let back: SealedSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sealed);
    }
}
