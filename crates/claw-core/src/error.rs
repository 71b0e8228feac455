use thiserror::Error;

use crate::types::{EventHash, Nonce};

/// The core error taxonomy (§7). Every validation-pipeline failure surfaces
/// as one of these kinds with structured fields; no partial mutation is ever
/// persisted alongside an error return.
#[derive(Debug, Error)]
pub enum ClawError {
    // ── Invalid: envelope integrity or schema failure ───────────────────────
    #[error("bad canonical form: {0}")]
    BadCanonicalForm(String),

    #[error("hash mismatch: envelope claims {claimed} but recomputes to {recomputed}")]
    HashMismatch { claimed: String, recomputed: String },

    #[error("signature mismatch for issuer {issuer}")]
    SignatureMismatch { issuer: String },

    #[error("issuer public key mismatch: `pub` does not derive `issuer`")]
    IssuerPublicKeyMismatch,

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    // ── Unauthorized ─────────────────────────────────────────────────────────
    #[error("issuer {issuer} is not authorized to mutate {resource}")]
    Unauthorized { issuer: String, resource: String },

    #[error("signing key unavailable for key id {0}")]
    SigningKeyUnavailable(String),

    // ── Duplicate ─────────────────────────────────────────────────────────────
    #[error("nonce {nonce} already consumed for issuer {issuer}")]
    DuplicateNonce { issuer: String, nonce: Nonce },

    #[error("event hash {0} already committed")]
    DuplicateEvent(EventHash),

    #[error("nonce {nonce} for issuer {issuer} resubmitted with a different hash: {incoming} vs committed {committed}")]
    NonceConflict {
        issuer: String,
        nonce: Nonce,
        incoming: EventHash,
        committed: EventHash,
    },

    // ── OutOfOrder ────────────────────────────────────────────────────────────
    #[error("nonce {got} for issuer {issuer} is ahead of head {head}; buffered")]
    OutOfOrder {
        issuer: String,
        head: Nonce,
        got: Nonce,
    },

    #[error("out-of-order buffer for issuer {0} is full")]
    FutureNonceBufferFull(String),

    // ── StaleResource ─────────────────────────────────────────────────────────
    #[error("prev {got:?} does not match current head {expected:?} for resource {resource}")]
    StaleResource {
        resource: String,
        expected: Option<EventHash>,
        got: Option<EventHash>,
    },

    #[error("resource {0} already created")]
    DuplicateCreate(String),

    // ── NotFound ──────────────────────────────────────────────────────────────
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    // ── Conflict: domain precondition violated ──────────────────────────────
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u128, have: u128 },

    #[error("amount must be at least 1")]
    ZeroAmount,

    #[error("self-transfer is not allowed")]
    SelfTransfer,

    #[error("resource {0} is in a terminal state")]
    AlreadyTerminal(String),

    #[error("invalid state transition: {from} -> {event} is not permitted")]
    InvalidTransition { from: String, event: String },

    #[error("milestone amounts sum to {got}, expected {expected}")]
    MilestoneAmountsDoNotSumToTotal { expected: u128, got: u128 },

    #[error("escrow {0} release/refund would exceed amount")]
    EscrowOverrelease(String),

    #[error("reputation record for (issuer, ref, dimension) already exists")]
    DuplicateReputationRecord,

    #[error("domain conflict: {0}")]
    Conflict(String),

    // ── RateLimited ───────────────────────────────────────────────────────────
    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    // ── Transient: storage/network error, retryable ─────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("network error: {0}")]
    Network(String),

    // ── Cryptography passthrough ─────────────────────────────────────────────
    #[error("cryptography error: {0}")]
    Crypto(#[from] claw_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("identity error: {0}")]
    Identity(String),

    #[error("{0}")]
    Other(String),
}

impl ClawError {
    /// Stable string code surfaced to callers (§6.1 error taxonomy).
    pub fn code(&self) -> &'static str {
        match self {
            ClawError::BadCanonicalForm(_)
            | ClawError::HashMismatch { .. }
            | ClawError::SignatureMismatch { .. }
            | ClawError::IssuerPublicKeyMismatch
            | ClawError::SchemaViolation(_) => "Invalid",

            ClawError::Unauthorized { .. } | ClawError::SigningKeyUnavailable(_) => "Unauthorized",

            ClawError::DuplicateNonce { .. }
            | ClawError::DuplicateEvent(_)
            | ClawError::NonceConflict { .. }
            | ClawError::DuplicateCreate(_) => "Duplicate",

            ClawError::OutOfOrder { .. } | ClawError::FutureNonceBufferFull(_) => "OutOfOrder",

            ClawError::StaleResource { .. } => "StaleResource",

            ClawError::NotFound { .. } => "NotFound",

            ClawError::InsufficientBalance { .. }
            | ClawError::ZeroAmount
            | ClawError::SelfTransfer
            | ClawError::AlreadyTerminal(_)
            | ClawError::InvalidTransition { .. }
            | ClawError::MilestoneAmountsDoNotSumToTotal { .. }
            | ClawError::EscrowOverrelease(_)
            | ClawError::DuplicateReputationRecord
            | ClawError::Conflict(_) => "Conflict",

            ClawError::RateLimited(_) => "RateLimited",

            ClawError::Storage(_) | ClawError::Network(_) => "Transient",

            ClawError::Crypto(_)
            | ClawError::Serialization(_)
            | ClawError::Identity(_)
            | ClawError::Other(_) => "Invalid",
        }
    }

    pub fn is_transient(&self) -> bool {
        self.code() == "Transient"
    }
}
