//! claw-p2p
//!
//! Gossip-based event propagation and range-backfill (C9, §4.9). GossipSub
//! broadcasts canonical envelope bytes to every subscribed peer; Kademlia
//! handles peer discovery and bootstrap; Identify/Ping maintain connection
//! metadata and liveness; a request-response protocol carries the
//! point-to-point `rangeReq`/`hello`/`peerScore` exchanges of §6.2.

pub mod config;
pub mod message;
pub mod network;
pub mod ratelimit;
pub mod scoring;

pub use config::P2pConfig;
pub use message::{P2pRequest, P2pResponse};
pub use network::{Inbound, Outbound, P2pHandle, P2pNetwork, PeerEventKind};
pub use ratelimit::IssuerRateLimiter;
pub use scoring::PeerScoreBook;
