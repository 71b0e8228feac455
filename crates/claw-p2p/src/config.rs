use claw_core::constants::RANGE_BACKFILL_CHUNK_TIMEOUT_SECS;

/// Configuration for the gossip/range-backfill network (§4.9, §6.2).
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Local listen multiaddress (e.g. "/ip4/0.0.0.0/tcp/7777").
    pub listen_addr: String,
    /// Bootstrap peer multiaddresses.
    pub bootstrap_peers: Vec<String>,
    /// Protocol version string advertised via identify and `hello`.
    pub protocol_version: String,
    /// GossipSub topic name events are broadcast on.
    pub gossip_topic: String,
    /// Per-chunk timeout for range-backfill requests before retrying
    /// against a different peer (§5).
    pub range_chunk_timeout_secs: u64,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            listen_addr: "/ip4/0.0.0.0/tcp/7777".into(),
            bootstrap_peers: Vec::new(),
            protocol_version: "/claw/1.0.0".into(),
            gossip_topic: "claw-events".into(),
            range_chunk_timeout_secs: RANGE_BACKFILL_CHUNK_TIMEOUT_SECS,
        }
    }
}
