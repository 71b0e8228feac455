//! Genesis/runtime parameters that are not themselves part of the derived
//! state but gate reducer preconditions (mint authority list, per-proposal-
//! type DAO thresholds). Grounded on `chronx-consensus`'s
//! validator-set-as-configuration pattern, generalized from a single 2/3
//! threshold to a per-proposal-type quorum/pass-threshold table.

use std::collections::HashMap;

use claw_core::constants::{DEFAULT_DAO_PASS_THRESHOLD_BPS, DEFAULT_DAO_QUORUM_BPS};
use claw_core::types::Did;

#[derive(Debug, Clone)]
pub struct ReducerParams {
    /// DIDs permitted to issue `wallet.mint`. Empty means mint is disabled.
    pub mint_authorities: Vec<Did>,
    /// Per-proposal-type `(quorumBps, passThresholdBps)`; falls back to the
    /// protocol defaults for an unlisted proposal kind.
    pub dao_thresholds: HashMap<String, (u32, u32)>,
}

impl Default for ReducerParams {
    fn default() -> Self {
        Self {
            mint_authorities: Vec::new(),
            dao_thresholds: HashMap::new(),
        }
    }
}

impl ReducerParams {
    pub fn can_mint(&self, issuer: &Did) -> bool {
        self.mint_authorities.iter().any(|d| d == issuer)
    }

    pub fn dao_threshold_for(&self, kind: &str) -> (u32, u32) {
        self.dao_thresholds
            .get(kind)
            .copied()
            .unwrap_or((DEFAULT_DAO_QUORUM_BPS, DEFAULT_DAO_PASS_THRESHOLD_BPS))
    }
}
