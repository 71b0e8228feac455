//! End-to-end smoke test for claw-node.
//!
//! Starts a real node process against a fresh data directory, configured as
//! its own mint authority, and drives it entirely through JSON-RPC.
//!
//! Run with:
//!   cargo test -p claw-node --test smoke

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

async fn rpc_call(client: &reqwest::Client, url: &str, method: &str, params: serde_json::Value) -> serde_json::Value {
    let body = serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
    let resp = client
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap_or_else(|e| panic!("RPC call {method} failed: {e}"));
    let json: serde_json::Value = resp.json().await.expect("parse RPC JSON");
    if let Some(err) = json.get("error") {
        panic!("RPC error from {method}: {err}");
    }
    json["result"].clone()
}

async fn wait_for_rpc(client: &reqwest::Client, url: &str, timeout: Duration) -> bool {
    let body = serde_json::json!({"jsonrpc": "2.0", "method": "claw_nodeStatus", "params": [], "id": 1});
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(resp) = client.post(url).json(&body).send().await {
            if resp.status().is_success() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    false
}

fn spawn_node(data_dir: &PathBuf, rpc_port: u16, p2p_port: u16, mint_authorities: &str) -> Child {
    Command::new(env!("CARGO_BIN_EXE_claw-node"))
        .env("CLAW_DATA_DIR", data_dir)
        .env("CLAW_API_LISTEN", format!("127.0.0.1:{rpc_port}"))
        .env("CLAW_API_ENABLE", "1")
        .env("CLAW_P2P_LISTEN", format!("/ip4/127.0.0.1/tcp/{p2p_port}"))
        .env("CLAW_PASSPHRASE", "smoke-test-passphrase")
        .env("CLAW_KEY_ID", "node")
        .env("CLAW_MINT_AUTHORITIES", mint_authorities)
        .env("CLAW_NETWORK", "smoke")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn claw-node")
}

/// Start a node once just to learn its own DID, then kill it — the real run
/// needs that DID ahead of time to list it as a mint authority.
async fn discover_did(data_dir: &PathBuf) -> String {
    let rpc_port = free_port();
    let p2p_port = free_port();
    let child = spawn_node(data_dir, rpc_port, p2p_port, "");
    let _guard = NodeGuard { child, data_dir: data_dir.clone() };
    let url = format!("http://127.0.0.1:{rpc_port}");
    let http = reqwest::Client::new();
    assert!(wait_for_rpc(&http, &url, Duration::from_secs(20)).await, "node did not become ready");
    let status = rpc_call(&http, &url, "claw_nodeStatus", serde_json::json!([])).await;
    status["did"].as_str().expect("did field").to_string()
}

#[tokio::test]
async fn smoke_mint_transfer_and_history() {
    let base_dir = std::env::temp_dir().join(format!("claw_e2e_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&base_dir);
    std::fs::create_dir_all(&base_dir).unwrap();

    // Discover the node's own DID so it can be listed as a mint authority on
    // the real run — `CLAW_MINT_AUTHORITIES` has to name it ahead of time.
    let discover_dir = base_dir.join("discover");
    let did = discover_did(&discover_dir).await;

    let data_dir = base_dir.join("run");
    let rpc_port = free_port();
    let p2p_port = free_port();
    let rpc_url = format!("http://127.0.0.1:{rpc_port}");

    let child = spawn_node(&data_dir, rpc_port, p2p_port, &did);
    let _guard = NodeGuard { child, data_dir: data_dir.clone() };

    let http = reqwest::Client::new();
    assert!(
        wait_for_rpc(&http, &rpc_url, Duration::from_secs(20)).await,
        "claw-node did not become ready within 20 seconds"
    );

    // Register the node's own identity.
    rpc_call(&http, &rpc_url, "claw_identityRegister", serde_json::json!([])).await;

    // Mint to its own address — the node is listed as its own mint authority.
    let status = rpc_call(&http, &rpc_url, "claw_nodeStatus", serde_json::json!([])).await;
    let address = status["address"].as_str().expect("address field").to_string();
    rpc_call(&http, &rpc_url, "claw_walletMint", serde_json::json!([address, "1000"])).await;

    let balance = rpc_call(&http, &rpc_url, "claw_walletBalance", serde_json::json!([address])).await;
    assert_eq!(balance["available"].as_str().unwrap(), "1000");

    // Transfer to a fresh, unregistered recipient address. It never needs a
    // matching private key: `wallet.transfer` only requires a well-formed,
    // checksummed address.
    let recipient_pub: [u8; 32] = rand::random();
    let recipient = claw_core::identity::address_from_public_key(&recipient_pub).0;
    rpc_call(
        &http,
        &rpc_url,
        "claw_walletTransfer",
        serde_json::json!([recipient, "250", serde_json::Value::Null, "smoke test transfer"]),
    )
    .await;

    // No fee given, so the minimum fee (1) applies on top of the 250 sent.
    let balance_after = rpc_call(&http, &rpc_url, "claw_walletBalance", serde_json::json!([address])).await;
    assert_eq!(balance_after["available"].as_str().unwrap(), "749");

    let history = rpc_call(&http, &rpc_url, "claw_walletHistory", serde_json::json!([address, 10])).await;
    let entries = history.as_array().expect("history array");
    assert!(entries.iter().any(|e| e["kind"] == "wallet.mint"));
    assert!(entries.iter().any(|e| e["kind"] == "wallet.transfer"));
}
