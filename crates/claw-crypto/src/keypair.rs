use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// An Ed25519 keypair. The secret key bytes are held in a `Zeroizing` buffer
/// and wiped on drop; the raw bytes are never exposed outside this module.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a fresh Ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Restore a keypair from a 32-byte secret key seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `message` with this keypair's secret key.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Seed bytes, wiped on drop by the caller's `Zeroizing` wrapper.
    pub fn seed_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ public: {} }}", hex::encode(self.public_key_bytes()))
    }
}

/// Verify an Ed25519 signature given raw public key, message, and signature bytes.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, CryptoError> {
    let pk_arr: [u8; 32] = public_key.try_into().map_err(|_| CryptoError::BadPublicKey)?;
    let verifying_key = VerifyingKey::from_bytes(&pk_arr).map_err(|_| CryptoError::BadPublicKey)?;
    let sig_arr: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::BadSignatureEncoding)?;
    let sig = Signature::from_bytes(&sig_arr);
    Ok(verifying_key.verify(message, &sig).is_ok())
}

/// Sign with a raw 32-byte seed, returning a 64-byte signature.
pub fn sign(seed: &[u8; 32], message: &[u8]) -> [u8; 64] {
    let signing_key = SigningKey::from_bytes(seed);
    signing_key.sign(message).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = KeyPair::generate();
        let msg = b"hello claw";
        let sig = kp.sign(msg);
        assert!(verify(&kp.public_key_bytes(), msg, &sig).unwrap());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"original");
        assert!(!verify(&kp.public_key_bytes(), b"tampered", &sig).unwrap());
    }
}
