//! Protocol-wide constants. Grounded on the flat, documented constant-module
//! convention of `chronx-core/src/constants.rs`.

use crate::types::Balance;

/// Current envelope protocol version (§3).
pub const PROTOCOL_VERSION: u8 = 1;

/// Minimum fee accepted on a `wallet.transfer` (§4.8.2).
pub const MIN_FEE: Balance = 1;

/// Bound on the per-issuer out-of-order buffer (§5).
pub const MAX_FUTURE_NONCES: usize = 64;

/// Eviction age for buffered future-nonce events (§5), in seconds.
pub const FUTURE_NONCE_TTL_SECS: i64 = 300;

/// Per-chunk timeout for range-backfill requests (§5), in seconds.
pub const RANGE_BACKFILL_CHUNK_TIMEOUT_SECS: u64 = 10;

/// Default page size for `rangeFromCursor` when the caller does not specify one.
pub const DEFAULT_RANGE_LIMIT: usize = 256;

/// Clock-skew tolerance for `ts` beyond which an event is delayed, not
/// rejected, by the gossip layer (§4.9 Anti-spam).
pub const MAX_FUTURE_TS_SKEW_MS: i64 = 30_000;

// ── Schema bounds ──────────────────────────────────────────────────────────

pub const MAX_MEMO_BYTES: usize = 512;
pub const MAX_METADATA_BYTES: usize = 4096;
pub const MAX_COMMENT_BYTES: usize = 1024;
pub const MAX_TAGS: usize = 16;
pub const MAX_TAG_LENGTH: usize = 32;
pub const MAX_MILESTONES: usize = 32;

// ── Reputation ───────────────────────────────────────────────────────────────

pub const MIN_REPUTATION_SCORE: u8 = 1;
pub const MAX_REPUTATION_SCORE: u8 = 5;

// ── DAO defaults (per-proposal-type parameters may override) ───────────────

pub const DEFAULT_DAO_QUORUM_BPS: u32 = 2000; // 20.00%, basis points
pub const DEFAULT_DAO_PASS_THRESHOLD_BPS: u32 = 5000; // 50.00%

// ── Peer scoring (§4.9) ──────────────────────────────────────────────────────

pub const PEER_SCORE_INITIAL: i64 = 0;
pub const PEER_SCORE_BAN_THRESHOLD: i64 = -100;
pub const PEER_SCORE_BAN_SECS: i64 = 3600;
pub const PEER_SCORE_INVALID_EVENT_PENALTY: i64 = -10;
pub const PEER_SCORE_DUPLICATE_PENALTY: i64 = -1;
pub const PEER_SCORE_MALFORMED_FRAMING_PENALTY: i64 = -25;
pub const PEER_SCORE_VALID_EVENT_REWARD: i64 = 1;

// ── Snapshots (§4.6) ─────────────────────────────────────────────────────────

pub const DEFAULT_MIN_SNAPSHOT_SIGNATURES: usize = 1;

// ── Anti-spam rate limiting (§4.9) ──────────────────────────────────────────

/// Rolling window over which a peer's nonce-advance rate is measured.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Max events a single issuer may advance through within one window.
pub const RATE_LIMIT_MAX_EVENTS_PER_WINDOW: u32 = 120;

/// Max canonical-bytes a single issuer may push through within one window.
pub const RATE_LIMIT_MAX_BYTES_PER_WINDOW: u64 = 2 * 1024 * 1024;
