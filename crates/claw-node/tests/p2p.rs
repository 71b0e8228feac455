//! P2P integration test for claw-node.
//!
//! Starts two node processes:
//!   Node A — bootstrap node (no peers)
//!   Node B — joins by dialing node A's advertised multiaddr
//!
//! Submits a command to node A and verifies node B converges on the same
//! wallet balance via GossipSub propagation.
//!
//! Run with:
//!   cargo test -p claw-node --test p2p

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

struct NodeGuard {
    child: Child,
    data_dir: PathBuf,
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.data_dir);
    }
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> Option<serde_json::Value> {
    let body = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
    let resp = client.post(url).json(&body).send().await.ok()?;
    let json: serde_json::Value = resp.json().await.ok()?;
    if json.get("error").is_some() {
        return None;
    }
    Some(json["result"].clone())
}

async fn rpc_call_unwrap(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    rpc_call(client, url, method, params)
        .await
        .unwrap_or_else(|| panic!("RPC call {method} returned error/none"))
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if rpc_call(client, url, "claw_nodeStatus", serde_json::json!([])).await.is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

async fn get_peer_multiaddr(client: &reqwest::Client, url: &str) -> String {
    let status = rpc_call_unwrap(client, url, "claw_nodeStatus", serde_json::json!([])).await;
    status["peer_multiaddr"].as_str().expect("peer_multiaddr field").to_string()
}

async fn get_balance(client: &reqwest::Client, url: &str, address: &str) -> String {
    let result = rpc_call_unwrap(client, url, "claw_walletBalance", serde_json::json!([address])).await;
    result["available"].as_str().unwrap().to_string()
}

/// Poll until `address`'s available balance matches `expected` on the given node.
async fn wait_for_balance(client: &reqwest::Client, url: &str, address: &str, expected: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(result) = rpc_call(client, url, "claw_walletBalance", serde_json::json!([address])).await {
            if result["available"].as_str() == Some(expected) {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    false
}

fn spawn_node(data_dir: &PathBuf, rpc_port: u16, p2p_port: u16, bootstrap: &str, mint_authorities: &str) -> Child {
    Command::new(env!("CARGO_BIN_EXE_claw-node"))
        .env("CLAW_DATA_DIR", data_dir)
        .env("CLAW_API_LISTEN", format!("127.0.0.1:{rpc_port}"))
        .env("CLAW_API_ENABLE", "1")
        .env("CLAW_P2P_LISTEN", format!("/ip4/127.0.0.1/tcp/{p2p_port}"))
        .env("CLAW_BOOTSTRAP", bootstrap)
        .env("CLAW_PASSPHRASE", "p2p-test-passphrase")
        .env("CLAW_KEY_ID", "node")
        .env("CLAW_MINT_AUTHORITIES", mint_authorities)
        .env("CLAW_NETWORK", "p2p-test")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn claw-node")
}

async fn discover_did(data_dir: &PathBuf) -> String {
    let rpc_port = free_port();
    let p2p_port = free_port();
    let child = spawn_node(data_dir, rpc_port, p2p_port, "", "");
    let _guard = NodeGuard { child, data_dir: data_dir.clone() };
    let url = format!("http://127.0.0.1:{rpc_port}");
    let http = reqwest::Client::new();
    assert!(wait_for_rpc(&http, &url, Duration::from_secs(20)).await, "node did not become ready");
    let status = rpc_call_unwrap(&http, &url, "claw_nodeStatus", serde_json::json!([])).await;
    status["did"].as_str().expect("did field").to_string()
}

#[tokio::test]
async fn p2p_gossip_propagates_mint_and_transfer() {
    let base_dir = std::env::temp_dir().join(format!("claw_p2p_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&base_dir);
    std::fs::create_dir_all(&base_dir).unwrap();

    let a_dir = base_dir.join("a");
    let b_dir = base_dir.join("b");

    // Node A needs to know its own DID ahead of time to list it as a mint authority.
    let discover_dir = base_dir.join("discover");
    let a_did = discover_did(&discover_dir).await;

    let http = reqwest::Client::new();

    // ── Node A: bootstrap, no peers ──────────────────────────────────────────
    let a_rpc_port = free_port();
    let a_p2p_port = free_port();
    let a_rpc_url = format!("http://127.0.0.1:{a_rpc_port}");
    let a_child = spawn_node(&a_dir, a_rpc_port, a_p2p_port, "", &a_did);
    let _a_guard = NodeGuard { child: a_child, data_dir: a_dir.clone() };
    assert!(wait_for_rpc(&http, &a_rpc_url, Duration::from_secs(20)).await, "node A did not become ready");

    let a_multiaddr = get_peer_multiaddr(&http, &a_rpc_url).await;

    // ── Node B: dials node A ─────────────────────────────────────────────────
    let b_rpc_port = free_port();
    let b_p2p_port = free_port();
    let b_rpc_url = format!("http://127.0.0.1:{b_rpc_port}");
    let b_child = spawn_node(&b_dir, b_rpc_port, b_p2p_port, &a_multiaddr, "");
    let _b_guard = NodeGuard { child: b_child, data_dir: b_dir.clone() };
    assert!(wait_for_rpc(&http, &b_rpc_url, Duration::from_secs(20)).await, "node B did not become ready");

    // Give the gossipsub mesh a moment to form over the dialed connection.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // ── Mint on A, expect the wallet event to propagate to B's state ────────
    rpc_call_unwrap(&http, &a_rpc_url, "claw_identityRegister", serde_json::json!([])).await;
    let a_status = rpc_call_unwrap(&http, &a_rpc_url, "claw_nodeStatus", serde_json::json!([])).await;
    let a_address = a_status["address"].as_str().unwrap().to_string();

    rpc_call_unwrap(&http, &a_rpc_url, "claw_walletMint", serde_json::json!([a_address, "500"])).await;

    assert_eq!(get_balance(&http, &a_rpc_url, &a_address).await, "500");
    assert!(
        wait_for_balance(&http, &b_rpc_url, &a_address, "500", Duration::from_secs(15)).await,
        "node B never observed the minted balance for {a_address} via gossip"
    );
}
