//! The peer↔peer message set (§6.2): `{kind: "gossip"|"rangeReq"|"rangeResp"|
//! "hello"|"peerScore", body}`. `gossip` is carried over the GossipSub topic
//! as raw canonical envelope bytes — a relay forwards exactly the bytes it
//! received and never re-serializes them, so byte-identical envelopes reach
//! every hop. `rangeReq`/`rangeResp`/`hello`/`peerScore` are point-to-point
//! and carried over libp2p's request-response protocol instead of gossip,
//! since they are answered by one specific peer rather than broadcast.

use claw_core::types::{Cursor, Did};
use serde::{Deserialize, Serialize};

/// A point-to-point request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum P2pRequest {
    /// Pull events from `fromCursor` (exclusive) up to `limit` entries.
    RangeReq { from_cursor: Cursor, limit: u32 },
    /// Sent once per connection after the Noise handshake completes.
    Hello {
        node_did: Did,
        protocol_version: String,
        topics: Vec<String>,
        self_cursor: Cursor,
    },
    /// Ask a peer to report back the score it has assigned to us.
    PeerScoreQuery,
}

/// The response to a [`P2pRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum P2pResponse {
    /// `events` are raw canonical envelope bytes, in cursor order.
    RangeResp {
        events: Vec<Vec<u8>>,
        next_cursor: Cursor,
        done: bool,
    },
    Hello {
        node_did: Did,
        protocol_version: String,
        topics: Vec<String>,
        self_cursor: Cursor,
    },
    PeerScore { score: i64, banned: bool },
}
