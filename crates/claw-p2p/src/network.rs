//! The gossip/range-backfill swarm (C9, §4.9, §6.2). Generalizes the
//! single-topic GossipSub + Kademlia + Identify + Ping behaviour in
//! `chronx-p2p/src/network.rs` to also carry point-to-point `rangeReq`/
//! `hello`/`peerScore` traffic over libp2p's request-response protocol,
//! since those are answered by one specific peer rather than broadcast —
//! ChronX only ever gossips vertices and never needed a point-to-point
//! exchange.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use claw_core::types::{Cursor, Did, Timestamp};
use futures::StreamExt;
use libp2p::{
    gossipsub, identify, kad, noise,
    request_response::{self, ResponseChannel},
    swarm::SwarmEvent,
    tcp, yamux, Multiaddr, PeerId, Swarm,
};
use libp2p_swarm::NetworkBehaviour;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::P2pConfig;
use crate::message::{P2pRequest, P2pResponse};
use crate::ratelimit::IssuerRateLimiter;
use crate::scoring::PeerScoreBook;

/// Cheaply extract `issuer` from raw envelope bytes for pre-validation rate
/// limiting — this is a transport-layer sniff, not a substitute for the
/// validation pipeline's own integrity check.
fn sniff_issuer(bytes: &[u8]) -> Option<Did> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    value.get("issuer")?.as_str().map(|s| Did(s.to_string()))
}

fn now_ms() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Timestamp
}

/// Combined libp2p network behaviour.
#[derive(NetworkBehaviour)]
pub struct ClawBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: libp2p::ping::Behaviour,
    pub reqres: request_response::cbor::Behaviour<P2pRequest, P2pResponse>,
}

/// Feedback the validation pipeline reports back about an event it received
/// from a given peer, driving that peer's score (§4.9).
#[derive(Debug, Clone, Copy)]
pub enum PeerEventKind {
    Valid,
    Invalid,
    Duplicate,
    FutureNonceEvicted,
}

/// An event arriving from the network, tagged with the originating peer.
#[derive(Debug)]
pub enum Inbound {
    /// Raw canonical envelope bytes received over the gossip topic.
    Gossip { peer: PeerId, envelope_bytes: Vec<u8> },
    /// A peer is pulling a range of events from us; answer exactly once via
    /// `Outbound::RespondRange`.
    RangeReq { peer: PeerId, from_cursor: Cursor, limit: u32, channel: ResponseChannel<P2pResponse> },
    Hello { peer: PeerId, node_did: Did, protocol_version: String, topics: Vec<String>, self_cursor: Cursor },
    PeerScoreQuery { peer: PeerId, channel: ResponseChannel<P2pResponse> },
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
}

/// A command sent into the network task.
pub enum Outbound {
    /// Broadcast raw canonical envelope bytes to every subscribed peer.
    PublishGossip(Vec<u8>),
    /// Pull a range of events from a specific peer; resolves via the
    /// `oneshot` once the peer answers, times out, or the connection drops.
    RequestRange { peer: PeerId, from_cursor: Cursor, limit: u32, respond: oneshot::Sender<Result<P2pResponse, String>> },
    SendHello { peer: PeerId, node_did: Did, protocol_version: String, topics: Vec<String>, self_cursor: Cursor },
    /// Answer a previously received `Inbound::RangeReq` or `PeerScoreQuery`.
    Respond { channel: ResponseChannel<P2pResponse>, response: P2pResponse },
    /// Feed back the outcome of processing an event received from `peer`.
    ReportPeerEvent { peer: PeerId, kind: PeerEventKind },
}

pub struct P2pHandle {
    pub outbound_tx: mpsc::Sender<Outbound>,
    pub inbound_rx: mpsc::Receiver<Inbound>,
    pub local_peer_id: PeerId,
}

/// Owns the libp2p `Swarm`. Spawn `network.run()` in a dedicated task.
pub struct P2pNetwork {
    swarm: Swarm<ClawBehaviour>,
    topic: gossipsub::IdentTopic,
    outbound_rx: mpsc::Receiver<Outbound>,
    inbound_tx: mpsc::Sender<Inbound>,
    scores: PeerScoreBook,
    rate_limiter: IssuerRateLimiter,
    pending_ranges: HashMap<request_response::OutboundRequestId, oneshot::Sender<Result<P2pResponse, String>>>,
}

impl P2pNetwork {
    pub fn new(config: &P2pConfig) -> Result<(Self, P2pHandle), Box<dyn std::error::Error + Send + Sync>> {
        let topic = gossipsub::IdentTopic::new(&config.gossip_topic);

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(tcp::Config::default(), noise::Config::new, yamux::Config::default)?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = libp2p::ping::Behaviour::default();

                let reqres = request_response::cbor::Behaviour::new(
                    [(libp2p::StreamProtocol::new("/claw/rangeexchange/1.0.0"), request_response::ProtocolSupport::Full)],
                    request_response::Config::default(),
                );

                Ok(ClawBehaviour { gossipsub, kademlia, identify, ping, reqres })
            })?
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                    swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    debug!(peer = %peer_id, "added bootstrap peer");
                }
                // `add_address` alone only seeds Kademlia's routing table; it
                // doesn't open a connection until some query needs that peer.
                // Dial explicitly so gossip has a live link from startup.
                if let Err(e) = swarm.dial(addr.clone()) {
                    warn!(%addr, error = %e, "failed to dial bootstrap peer");
                }
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let network = P2pNetwork {
            swarm,
            topic,
            outbound_rx,
            inbound_tx,
            scores: PeerScoreBook::new(),
            rate_limiter: IssuerRateLimiter::new(),
            pending_ranges: HashMap::new(),
        };
        let handle = P2pHandle { outbound_tx, inbound_rx, local_peer_id };

        Ok((network, handle))
    }

    /// Drive the event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.outbound_rx.recv() => self.handle_outbound(cmd),
                event = self.swarm.select_next_some() => self.handle_swarm_event(event).await,
            }
        }
    }

    fn handle_outbound(&mut self, cmd: Outbound) {
        match cmd {
            Outbound::PublishGossip(bytes) => {
                if let Err(e) = self.swarm.behaviour_mut().gossipsub.publish(self.topic.clone(), bytes) {
                    warn!(error = %e, "gossipsub publish failed");
                }
            }
            Outbound::RequestRange { peer, from_cursor, limit, respond } => {
                let request_id = self
                    .swarm
                    .behaviour_mut()
                    .reqres
                    .send_request(&peer, P2pRequest::RangeReq { from_cursor, limit });
                self.pending_ranges.insert(request_id, respond);
            }
            Outbound::SendHello { peer, node_did, protocol_version, topics, self_cursor } => {
                self.swarm.behaviour_mut().reqres.send_request(
                    &peer,
                    P2pRequest::Hello { node_did, protocol_version, topics, self_cursor },
                );
            }
            Outbound::Respond { channel, response } => {
                let _ = self.swarm.behaviour_mut().reqres.send_response(channel, response);
            }
            Outbound::ReportPeerEvent { peer, kind } => {
                let now = now_ms();
                match kind {
                    PeerEventKind::Valid => self.scores.note_valid_event(peer, now),
                    PeerEventKind::Invalid => self.scores.note_invalid_event(peer, now),
                    PeerEventKind::Duplicate => self.scores.note_duplicate_event(peer, now),
                    PeerEventKind::FutureNonceEvicted => self.scores.note_future_nonce_evicted(peer, now),
                }
                if self.scores.is_banned(&peer, now) {
                    info!(%peer, "peer score below threshold, disconnecting");
                    let _ = self.swarm.disconnect_peer_id(peer);
                }
            }
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<ClawBehaviourEvent>) {
        let now = now_ms();
        match event {
            SwarmEvent::NewListenAddr { address, .. } => info!(addr = %address, "p2p listening"),
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                let _ = self.inbound_tx.send(Inbound::PeerConnected(peer_id)).await;
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                let _ = self.inbound_tx.send(Inbound::PeerDisconnected(peer_id)).await;
            }
            SwarmEvent::Behaviour(ClawBehaviourEvent::Gossipsub(gossipsub::Event::Message { propagation_source, message, .. })) => {
                if self.scores.is_banned(&propagation_source, now) {
                    return;
                }
                if let Some(issuer) = sniff_issuer(&message.data) {
                    if self.rate_limiter.check_and_record(&issuer, now, message.data.len() as u64).is_err() {
                        debug!(%issuer, peer = %propagation_source, "dropping gossip event over rate limit");
                        return;
                    }
                }
                let _ = self
                    .inbound_tx
                    .send(Inbound::Gossip { peer: propagation_source, envelope_bytes: message.data })
                    .await;
            }
            SwarmEvent::Behaviour(ClawBehaviourEvent::Identify(identify::Event::Received { peer_id, info, .. })) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::Behaviour(ClawBehaviourEvent::Reqres(request_response::Event::Message { peer, message, .. })) => {
                if self.scores.is_banned(&peer, now) {
                    return;
                }
                match message {
                    request_response::Message::Request { request, channel, .. } => match request {
                        P2pRequest::RangeReq { from_cursor, limit } => {
                            let _ = self.inbound_tx.send(Inbound::RangeReq { peer, from_cursor, limit, channel }).await;
                        }
                        P2pRequest::Hello { node_did, protocol_version, topics, self_cursor } => {
                            let _ = self
                                .inbound_tx
                                .send(Inbound::Hello { peer, node_did, protocol_version, topics, self_cursor })
                                .await;
                        }
                        P2pRequest::PeerScoreQuery => {
                            let _ = self.inbound_tx.send(Inbound::PeerScoreQuery { peer, channel }).await;
                        }
                    },
                    request_response::Message::Response { request_id, response } => {
                        if let Some(respond) = self.pending_ranges.remove(&request_id) {
                            let _ = respond.send(Ok(response));
                        }
                    }
                }
            }
            SwarmEvent::Behaviour(ClawBehaviourEvent::Reqres(request_response::Event::OutboundFailure { request_id, error, .. })) => {
                if let Some(respond) = self.pending_ranges.remove(&request_id) {
                    let _ = respond.send(Err(error.to_string()));
                }
            }
            SwarmEvent::Behaviour(ClawBehaviourEvent::Reqres(request_response::Event::InboundFailure { peer, .. })) => {
                self.scores.note_malformed_framing(peer, now);
            }
            _ => {}
        }
    }
}
