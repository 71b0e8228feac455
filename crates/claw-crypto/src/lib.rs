//! Cryptographic primitives for the claw protocol: Ed25519 signing, SHA-256,
//! AES-256-GCM, Argon2id, HKDF-SHA256, X25519, JCS canonicalization, BIP-39,
//! and Shamir secret sharing. Every primitive here fails with a typed
//! [`CryptoError`] on malformed input rather than panicking.

pub mod aead;
pub mod error;
pub mod hash;
pub mod jcs;
pub mod kdf;
pub mod keypair;
pub mod mnemonic;
pub mod shamir;
pub mod x25519;

pub use error::CryptoError;
pub use hash::sha256;
pub use keypair::KeyPair;
