//! Node configuration, loaded from environment variables with an optional
//! `config.json` fallback (§6.3). Grounded on the flat
//! config-struct-plus-env-override convention in `chronx-node/src/main.rs`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ClawError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Root for log, indexes, keystore (`CLAW_DATA_DIR`).
    pub data_dir: PathBuf,
    /// Host:port for the typed command surface (`CLAW_API_LISTEN`).
    pub api_listen: String,
    /// Disable the command surface for pure-relay nodes (`CLAW_API_ENABLE`).
    pub api_enable: bool,
    /// Multiaddress-style listen specs, repeatable (`CLAW_P2P_LISTEN`, comma-separated).
    pub p2p_listen: Vec<String>,
    /// Seed peer addresses, repeatable (`CLAW_BOOTSTRAP`, comma-separated).
    pub bootstrap: Vec<String>,
    /// Required to open/create the keystore (`CLAW_PASSPHRASE`). Never logged.
    #[serde(skip_serializing)]
    pub passphrase: String,
    /// Period of peer health checks, in ms (`CLAW_HEALTH_INTERVAL_MS`).
    pub health_interval_ms: u64,
    /// Chain ID label for domain separation (`CLAW_NETWORK`).
    pub network: String,
    /// Keystore id for this node's own signing key (`CLAW_KEY_ID`).
    pub key_id: String,
    /// DIDs permitted to issue `wallet.mint`, comma-separated (`CLAW_MINT_AUTHORITIES`).
    pub mint_authorities: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            api_listen: "127.0.0.1:8765".to_string(),
            api_enable: true,
            p2p_listen: vec!["/ip4/0.0.0.0/tcp/4001".to_string()],
            bootstrap: Vec::new(),
            passphrase: String::new(),
            health_interval_ms: 30_000,
            network: "devnet".to_string(),
            key_id: "node".to_string(),
            mint_authorities: Vec::new(),
        }
    }
}

impl NodeConfig {
    /// Load from a `config.json` file (if present) then apply environment
    /// overrides — env always wins, matching `chronx-node`'s startup sequence.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ClawError> {
        let mut cfg = match config_path {
            Some(path) if path.exists() => {
                let bytes = std::fs::read(path).map_err(|e| ClawError::Storage(e.to_string()))?;
                serde_json::from_slice(&bytes).map_err(|e| ClawError::Serialization(e.to_string()))?
            }
            _ => NodeConfig::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CLAW_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CLAW_API_LISTEN") {
            self.api_listen = v;
        }
        if let Ok(v) = std::env::var("CLAW_API_ENABLE") {
            self.api_enable = v != "0" && v.to_lowercase() != "false";
        }
        if let Ok(v) = std::env::var("CLAW_P2P_LISTEN") {
            self.p2p_listen = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = std::env::var("CLAW_BOOTSTRAP") {
            self.bootstrap = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("CLAW_PASSPHRASE") {
            self.passphrase = v;
        }
        if let Ok(v) = std::env::var("CLAW_HEALTH_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.health_interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("CLAW_NETWORK") {
            self.network = v;
        }
        if let Ok(v) = std::env::var("CLAW_KEY_ID") {
            self.key_id = v;
        }
        if let Ok(v) = std::env::var("CLAW_MINT_AUTHORITIES") {
            self.mint_authorities = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("log")
    }

    pub fn keystore_dir(&self) -> PathBuf {
        self.data_dir.join("keystore")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = NodeConfig::default();
        assert!(cfg.api_enable);
        assert_eq!(cfg.network, "devnet");
    }
}
