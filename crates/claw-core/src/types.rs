use serde::{Deserialize, Serialize};
use std::fmt;

/// Token balance in the smallest unit (integer-valued; smallest unit is 1).
/// Travels across the wire as an unsigned decimal string, never as a JSON
/// number, so it is exempt from the canonicalizer's safe-integer limits.
pub type Balance = u128;

/// Unix-ms wall clock, advisory only (see §3 Event envelope: `ts`).
pub type Timestamp = i64;

/// Strictly monotonic per-issuer sequence number, starting at 1.
pub type Nonce = u64;

// ── EventHash ────────────────────────────────────────────────────────────────

/// SHA-256 of an envelope's canonical bytes with `sig`/`hash` zeroed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventHash(pub [u8; 32]);

impl EventHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 32];
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for EventHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHash({}…)", &self.to_hex()[..16])
    }
}

// ── Cursor ───────────────────────────────────────────────────────────────────

/// Opaque, monotonically advancing position in the log used for range
/// backfill. Implemented as a dense append sequence number; callers MUST
/// treat it as opaque (§4.5).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Cursor(pub u64);

impl Cursor {
    pub const START: Cursor = Cursor(0);

    pub fn next(self) -> Cursor {
        Cursor(self.0 + 1)
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Cursor {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Cursor::START);
        }
        Ok(Cursor(s.parse()?))
    }
}

// ── Did / Address ────────────────────────────────────────────────────────────

/// `did:claw:z<base58btc-ed25519-pubkey>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Did(pub String);

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

/// `claw<base58(version‖pubkey‖checksum)>`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub String);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

// ── ResourceKind ─────────────────────────────────────────────────────────────

/// The kinds of resource a `prev`-hash chain may be rooted on (§3 Glossary).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Identity,
    Wallet,
    Escrow,
    Listing,
    Order,
    Contract,
    Reputation,
    DaoProposal,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Identity => "identity",
            ResourceKind::Wallet => "wallet",
            ResourceKind::Escrow => "escrow",
            ResourceKind::Listing => "listing",
            ResourceKind::Order => "order",
            ResourceKind::Contract => "contract",
            ResourceKind::Reputation => "reputation",
            ResourceKind::DaoProposal => "daoProposal",
        };
        write!(f, "{s}")
    }
}

/// `(kind, id)` — the unit that a hash-linked event chain is rooted on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub id: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn index_key(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}
