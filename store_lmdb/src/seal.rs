//! Argon2id + AES-256-GCM sealing of key secrets.
//!
//! A secret is sealed with a user-chosen password:
//! 1. Argon2id derives a 32-byte encryption key from the password + random salt
//! 2. AES-256-GCM encrypts the secret with a random nonce
//! 3. The parameters needed to reverse this are stored next to the ciphertext

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use ember_types::Secret;

use crate::LmdbError;

/// Salt length in bytes.
const SALT_LEN: usize = 32;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

pub const CIPHER: &str = "aes-256-gcm";
pub const KDF: &str = "argon2id";

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MB memory, 3 iterations, 1 lane.
    fn default() -> Self {
        Self {
            memory: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// A sealed secret with everything needed to open it again, except the password.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

/// Seal `secret` under `password`.
pub fn seal(secret: &Secret, password: &Secret, params: KdfParams) -> Result<SealedSecret, LmdbError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| LmdbError::Crypto(format!("salt: {e}")))?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut nonce_bytes).map_err(|e| LmdbError::Crypto(format!("nonce: {e}")))?;

    let derived_key = derive_key(password, &salt, params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived_key[..])
        .map_err(|e| LmdbError::Crypto(format!("AES key init failed: {e}")))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), secret.expose().as_bytes())
        .map_err(|e| LmdbError::Crypto(format!("encryption failed: {e}")))?;

    Ok(SealedSecret {
        cipher: CIPHER.to_string(),
        kdf: KDF.to_string(),
        kdf_params: params,
        salt: hex::encode(salt),
        nonce: hex::encode(nonce_bytes),
        ciphertext: hex::encode(ciphertext),
    })
}

/// Open a sealed secret. Any failure to decode or decrypt is reported as
/// [`LmdbError::Credential`].
pub fn open(sealed: &SealedSecret, password: &Secret) -> Result<Secret, LmdbError> {
    if sealed.cipher != CIPHER || sealed.kdf != KDF {
        return Err(LmdbError::Credential);
    }
    let salt = hex::decode(&sealed.salt).map_err(|_| LmdbError::Credential)?;
    let nonce_bytes = hex::decode(&sealed.nonce).map_err(|_| LmdbError::Credential)?;
    let ciphertext = hex::decode(&sealed.ciphertext).map_err(|_| LmdbError::Credential)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(LmdbError::Credential);
    }

    let derived_key =
        derive_key(password, &salt, sealed.kdf_params).map_err(|_| LmdbError::Credential)?;
    let cipher =
        Aes256Gcm::new_from_slice(&derived_key[..]).map_err(|_| LmdbError::Credential)?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| LmdbError::Credential)?,
    );
    let text = std::str::from_utf8(&plaintext).map_err(|_| LmdbError::Credential)?;
    Ok(Secret::new(text))
}

fn derive_key(
    password: &Secret,
    salt: &[u8],
    params: KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, LmdbError> {
    let params = Params::new(params.memory, params.iterations, params.parallelism, Some(KEY_LEN))
        .map_err(|e| LmdbError::Crypto(format!("Argon2 params error: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(password.expose().as_bytes(), salt, &mut output[..])
        .map_err(|e| LmdbError::Crypto(format!("Argon2 hashing failed: {e}")))?;
    Ok(output)
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        memory: 256,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let secret = Secret::new("alpha beta gamma delta");
        let sealed = seal(&secret, &Secret::new("pw"), test_params()).unwrap();
        let opened = open(&sealed, &Secret::new("pw")).unwrap();
        assert_eq!(opened.expose(), secret.expose());
    }

    #[test]
    fn wrong_password_is_credential_error() {
        let sealed = seal(&Secret::new("seed"), &Secret::new("p2"), test_params()).unwrap();
        let result = open(&sealed, &Secret::new("p1"));
        assert!(matches!(result, Err(LmdbError::Credential)));
    }

    #[test]
    fn corrupted_ciphertext_is_credential_error() {
        let mut sealed = seal(&Secret::new("seed"), &Secret::new("pw"), test_params()).unwrap();
        sealed.ciphertext = "zz".into();
        assert!(matches!(open(&sealed, &Secret::new("pw")), Err(LmdbError::Credential)));
    }

    #[test]
    fn records_parameters() {
        let sealed = seal(&Secret::new("seed"), &Secret::new("pw"), test_params()).unwrap();
        assert_eq!(sealed.cipher, "aes-256-gcm");
        assert_eq!(sealed.kdf, "argon2id");
        assert_eq!(sealed.kdf_params, test_params());
    }

    #[test]
    fn same_secret_seals_differently() {
        let secret = Secret::new("seed");
        let a = seal(&secret, &Secret::new("pw"), test_params()).unwrap();
        let b = seal(&secret, &Secret::new("pw"), test_params()).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn default_params_match_production_cost() {
        let params = KdfParams::default();
        assert_eq!(params.memory, 65536);
        assert_eq!(params.iterations, 3);
        assert_eq!(params.parallelism, 1);
    }
}
