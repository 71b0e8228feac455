use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// An ephemeral X25519 keypair used for one-off key agreement (e.g. the
/// buyer-supplied ephemeral public key in an info-listing purchase).
pub struct EphemeralKeyPair {
    secret: StaticSecret,
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(rand::rngs::OsRng),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        PublicKey::from(&self.secret).to_bytes()
    }

    /// Perform the Diffie-Hellman agreement against a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
        let arr: [u8; 32] = peer_public.try_into().map_err(|_| CryptoError::BadX25519Key)?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(arr));
        Ok(Zeroizing::new(shared.to_bytes()))
    }
}

/// Standalone X25519 agreement given raw 32-byte private/public keys.
pub fn x25519(private: &[u8; 32], public: &[u8]) -> Result<[u8; 32], CryptoError> {
    let pub_arr: [u8; 32] = public.try_into().map_err(|_| CryptoError::BadX25519Key)?;
    let secret = StaticSecret::from(*private);
    Ok(secret.diffie_hellman(&PublicKey::from(pub_arr)).to_bytes())
}

/// Validate that `bytes` is a well-formed 32-byte X25519 public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::BadX25519Key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_is_symmetric() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        let shared_a = a.diffie_hellman(&b.public_key_bytes()).unwrap();
        let shared_b = b.diffie_hellman(&a.public_key_bytes()).unwrap();
        assert_eq!(*shared_a, *shared_b);
    }
}
