use thiserror::Error;

/// Errors raised by primitive cryptographic operations.
///
/// Primitives never panic on malformed input; every failure mode surfaces
/// here instead.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid ed25519 public key")]
    BadPublicKey,

    #[error("invalid ed25519 secret key")]
    BadSecretKey,

    #[error("invalid ed25519 signature encoding")]
    BadSignatureEncoding,

    #[error("signature verification failed")]
    VerifyFailed,

    #[error("invalid x25519 public key")]
    BadX25519Key,

    #[error("AES-256-GCM seal failed")]
    SealFailed,

    #[error("AES-256-GCM open failed (wrong key or tampered ciphertext)")]
    OpenFailed,

    #[error("argon2id derivation failed: {0}")]
    KdfFailed(String),

    #[error("hkdf expand failed: requested length exceeds 255 * hash length")]
    HkdfLengthInvalid,

    #[error("invalid BIP-39 mnemonic: {0}")]
    BadMnemonic(String),

    #[error("shamir split requires threshold <= shares")]
    BadShamirParams,

    #[error("shamir recovery failed: insufficient or inconsistent shares")]
    ShamirRecoverFailed,

    #[error("value is not canonicalizable: {0}")]
    NotCanonicalizable(String),
}
