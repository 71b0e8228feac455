use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;

/// Seal `plaintext` under `key` (32 bytes) and `nonce` (12 bytes), authenticating
/// `associated_data`. Returns ciphertext with the 16-byte tag appended.
pub fn seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    associated_data: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::SealFailed)
}

/// Open a ciphertext produced by [`seal`].
pub fn open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    associated_data: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::OpenFailed)
}

/// Draw a fresh random 12-byte nonce. Callers MUST never reuse a nonce under
/// the same key.
pub fn random_nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut n = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut n);
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_open_round_trips() {
        let key = [7u8; KEY_LEN];
        let nonce = random_nonce();
        let ct = seal(&key, &nonce, b"aad", b"secret payload").unwrap();
        let pt = open(&key, &nonce, b"aad", &ct).unwrap();
        assert_eq!(pt, b"secret payload");
    }

    #[test]
    fn wrong_aad_fails() {
        let key = [7u8; KEY_LEN];
        let nonce = random_nonce();
        let ct = seal(&key, &nonce, b"aad", b"secret payload").unwrap();
        assert!(open(&key, &nonce, b"different-aad", &ct).is_err());
    }
}
