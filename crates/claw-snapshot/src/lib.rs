//! Signed state-root snapshots (C6, §4.6). A snapshot is an advisory,
//! multi-signed checkpoint of the derived-state cache, used to bootstrap a
//! new node or fast-forward a lagging one without replaying the full log.
//! Grounded on `chronx-genesis` (a state root built once and
//! trusted without replay) and `chronx-recovery`'s multi-verifier signature
//! counting (`RecoveryRequest::signatures`, threshold check before a
//! recovery is honored) — applied here to snapshot trust instead of key
//! recovery.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use claw_core::error::ClawError;
use claw_core::types::EventHash;
use claw_reducers::State;

/// One signer's attestation over a snapshot's hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotSignature {
    pub peer_id: String,
    pub sig: String,
}

/// A signed checkpoint of the derived state at a given log position.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub v: u8,
    /// The log position this snapshot covers: a cursor or event hash,
    /// rendered as a string so either form round-trips through JCS.
    pub at: String,
    pub prev: Option<EventHash>,
    pub state: Value,
    pub hash: EventHash,
    pub signatures: Vec<SnapshotSignature>,
}

fn skeleton(v: u8, at: &str, prev: Option<EventHash>, state: &Value) -> Value {
    json!({
        "v": v,
        "at": at,
        "prev": prev.as_ref().map(EventHash::to_hex),
        "state": state,
        "signatures": Vec::<Value>::new(),
    })
}

fn compute_hash(v: u8, at: &str, prev: Option<EventHash>, state: &Value) -> Result<EventHash, ClawError> {
    let bytes = claw_crypto::jcs::canonicalize(&skeleton(v, at, prev, state))?;
    Ok(EventHash::from_bytes(claw_crypto::hash::sha256(&bytes)))
}

impl Snapshot {
    /// Build an unsigned snapshot from a derived-state cache. Signatures are
    /// attached afterward by each participating peer via [`Snapshot::sign`].
    pub fn build(v: u8, at: impl Into<String>, prev: Option<EventHash>, state: &State) -> Result<Self, ClawError> {
        let at = at.into();
        let state_value = serde_json::to_value(state).map_err(|e| ClawError::Serialization(e.to_string()))?;
        let hash = compute_hash(v, &at, prev, &state_value)?;
        Ok(Self {
            v,
            at,
            prev,
            state: state_value,
            hash,
            signatures: Vec::new(),
        })
    }

    /// Append this peer's signature over the snapshot hash. Does not
    /// deduplicate — callers that re-sign twice get two entries; verification
    /// counts distinct valid `peerId`s, not raw signature count.
    pub fn sign(&mut self, peer_id: impl Into<String>, signer: impl FnOnce(&[u8]) -> [u8; 64]) {
        let sig = signer(self.hash.as_bytes());
        self.signatures.push(SnapshotSignature {
            peer_id: peer_id.into(),
            sig: hex::encode(sig),
        });
    }

    /// Recompute the hash and verify it matches the carried `hash` field.
    pub fn verify_hash(&self) -> Result<(), ClawError> {
        let recomputed = compute_hash(self.v, &self.at, self.prev, &self.state)?;
        if recomputed != self.hash {
            return Err(ClawError::HashMismatch {
                claimed: self.hash.to_hex(),
                recomputed: recomputed.to_hex(),
            });
        }
        Ok(())
    }

    /// Verify this snapshot has at least `min_signatures` valid, distinct-peer
    /// signatures over its hash, resolving each `peerId` to a public key via
    /// `resolve`. Snapshots are advisory (§4.6): callers decide what to do
    /// with an unsatisfied threshold, this only reports pass/fail.
    pub fn verify_signatures(
        &self,
        min_signatures: usize,
        resolve: impl Fn(&str) -> Option<[u8; 32]>,
    ) -> Result<(), ClawError> {
        self.verify_hash()?;

        let mut seen = std::collections::HashSet::new();
        let mut valid = 0usize;
        for s in &self.signatures {
            if !seen.insert(s.peer_id.clone()) {
                continue;
            }
            let Some(pubkey) = resolve(&s.peer_id) else { continue };
            let Ok(sig_bytes) = hex::decode(&s.sig) else { continue };
            if claw_crypto::keypair::verify(&pubkey, self.hash.as_bytes(), &sig_bytes).unwrap_or(false) {
                valid += 1;
            }
        }

        if valid < min_signatures {
            return Err(ClawError::Conflict(format!(
                "snapshot has {valid} valid signature(s), need at least {min_signatures}"
            )));
        }
        Ok(())
    }

    /// Deserialize the carried state back into a derived-state cache, e.g.
    /// to bootstrap a new node. Does not itself verify signatures — callers
    /// should call [`Snapshot::verify_signatures`] first.
    pub fn into_state(self) -> Result<State, ClawError> {
        serde_json::from_value(self.state).map_err(|e| ClawError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claw_crypto::KeyPair;

    fn peer() -> (KeyPair, String) {
        let kp = KeyPair::generate();
        let peer_id = hex::encode(kp.public_key_bytes());
        (kp, peer_id)
    }

    #[test]
    fn sign_then_verify_with_threshold() {
        let state = State::default();
        let mut snap = Snapshot::build(1, "cursor:100", None, &state).unwrap();

        let (kp1, id1) = peer();
        let (kp2, id2) = peer();
        let (kp3, _id3) = peer();

        snap.sign(id1.clone(), |b| kp1.sign(b));
        snap.sign(id2.clone(), |b| kp2.sign(b));

        let keys: std::collections::HashMap<String, [u8; 32]> =
            [(id1, kp1.public_key_bytes()), (id2, kp2.public_key_bytes())].into_iter().collect();
        let _ = kp3;

        assert!(snap.verify_signatures(2, |id| keys.get(id).copied()).is_ok());
        assert!(snap.verify_signatures(3, |id| keys.get(id).copied()).is_err());
    }

    #[test]
    fn tampered_state_fails_hash_verification() {
        let state = State::default();
        let mut snap = Snapshot::build(1, "cursor:1", None, &state).unwrap();
        snap.state = json!({"tampered": true});
        assert!(matches!(snap.verify_hash(), Err(ClawError::HashMismatch { .. })));
    }

    #[test]
    fn unresolvable_peer_id_does_not_count_toward_threshold() {
        let state = State::default();
        let mut snap = Snapshot::build(1, "cursor:5", None, &state).unwrap();
        let (kp, id) = peer();
        snap.sign(id, |b| kp.sign(b));
        assert!(snap.verify_signatures(1, |_| None).is_err());
    }

    #[test]
    fn duplicate_peer_signatures_count_once() {
        let state = State::default();
        let mut snap = Snapshot::build(1, "cursor:5", None, &state).unwrap();
        let (kp, id) = peer();
        snap.sign(id.clone(), |b| kp.sign(b));
        snap.sign(id.clone(), |b| kp.sign(b));
        let keys: std::collections::HashMap<String, [u8; 32]> = [(id, kp.public_key_bytes())].into_iter().collect();
        assert!(snap.verify_signatures(2, |id| keys.get(id).copied()).is_err());
        assert!(snap.verify_signatures(1, |id| keys.get(id).copied()).is_ok());
    }

    #[test]
    fn state_round_trips_through_snapshot() {
        let state = State::default();
        let snap = Snapshot::build(1, "cursor:1", None, &state).unwrap();
        let recovered = snap.into_state().unwrap();
        assert_eq!(recovered.treasury, state.treasury);
    }
}
