use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Argon2id parameters. Defaults chosen for an interactive keystore unlock
/// (roughly OWASP's "second recommended option").
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Argon2Params {
    /// Iterations (time cost).
    pub t: u32,
    /// Memory cost in KiB.
    pub m: u32,
    /// Parallelism (lanes).
    pub p: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            t: 3,
            m: 64 * 1024,
            p: 1,
        }
    }
}

/// Derive a key of `dk_len` bytes from `passphrase` and `salt` via Argon2id.
pub fn argon2id(
    passphrase: &[u8],
    salt: &[u8],
    params: Argon2Params,
    dk_len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let argon2_params = Params::new(params.m, params.t, params.p, Some(dk_len))
        .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
    let mut out = vec![0u8; dk_len];
    argon2
        .hash_password_into(passphrase, salt, &mut out)
        .map_err(|e| CryptoError::KdfFailed(e.to_string()))?;
    Ok(Zeroizing::new(out))
}

/// HKDF-SHA256 expand (with extract) to `len` bytes.
pub fn hkdf_sha256(
    ikm: &[u8],
    salt: &[u8],
    info: &[u8],
    len: usize,
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut out = vec![0u8; len];
    hk.expand(info, &mut out)
        .map_err(|_| CryptoError::HkdfLengthInvalid)?;
    Ok(Zeroizing::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2id_is_deterministic_for_same_inputs() {
        let salt = [1u8; 16];
        let a = argon2id(b"passphrase", &salt, Argon2Params::default(), 32).unwrap();
        let b = argon2id(b"passphrase", &salt, Argon2Params::default(), 32).unwrap();
        assert_eq!(*a, *b);
    }

    #[test]
    fn different_passphrase_differs() {
        let salt = [1u8; 16];
        let a = argon2id(b"passphrase-a", &salt, Argon2Params::default(), 32).unwrap();
        let b = argon2id(b"passphrase-b", &salt, Argon2Params::default(), 32).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn hkdf_expands_to_requested_length() {
        let out = hkdf_sha256(b"ikm", b"salt", b"info", 48).unwrap();
        assert_eq!(out.len(), 48);
    }
}
