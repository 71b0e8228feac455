//! The event envelope (C4, §3–§4.4): a typed, signed, hash-addressed record
//! carrying one protocol action. Canonical bytes are JCS; `hash` and `sig`
//! are each uniquely determined by the rest of the envelope so both may be
//! verified independently.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::PROTOCOL_VERSION;
use crate::error::ClawError;
use crate::identity::public_key_from_did;
use crate::types::{Did, EventHash, Nonce, Timestamp};

/// A signed, hash-addressed protocol event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u8,
    #[serde(rename = "type")]
    pub kind: String,
    pub issuer: Did,
    #[serde(rename = "pub")]
    pub public_key: String,
    pub ts: Timestamp,
    pub nonce: Nonce,
    pub prev: Option<EventHash>,
    pub payload: Value,
    pub sig: String,
    pub hash: EventHash,
}

impl Envelope {
    /// Build and sign a new envelope. `signer` receives the signing bytes
    /// (canonical form with `sig=""`, `hash=<hash>`) and returns a 64-byte
    /// Ed25519 signature — this is the keystore's only contact with the
    /// envelope module (§4.3: the keystore never returns the raw private key).
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        kind: &str,
        issuer: Did,
        public_key_bytes: &[u8; 32],
        nonce: Nonce,
        prev: Option<EventHash>,
        payload: Value,
        ts: Timestamp,
        signer: impl FnOnce(&[u8]) -> [u8; 64],
    ) -> Result<Self, ClawError> {
        let public_key = multibase_ed25519(public_key_bytes);
        let skeleton = json!({
            "v": PROTOCOL_VERSION,
            "type": kind,
            "issuer": issuer.0,
            "pub": public_key,
            "ts": ts,
            "nonce": nonce,
            "prev": prev.as_ref().map(EventHash::to_hex),
            "payload": payload,
            "sig": "",
            "hash": "",
        });
        let hash_bytes = claw_crypto::jcs::canonicalize(&skeleton)?;
        let hash = EventHash::from_bytes(claw_crypto::hash::sha256(&hash_bytes));

        let with_hash = {
            let mut v = skeleton;
            v["hash"] = json!(hash.to_hex());
            v
        };
        let signing_bytes = claw_crypto::jcs::canonicalize(&with_hash)?;
        let sig_bytes = signer(&signing_bytes);
        let sig = hex::encode(sig_bytes);

        Ok(Envelope {
            v: PROTOCOL_VERSION,
            kind: kind.to_string(),
            issuer,
            public_key,
            ts,
            nonce,
            prev,
            payload: with_hash["payload"].clone(),
            sig,
            hash,
        })
    }

    /// Verify envelope integrity: recompute `hash`, recompute the signing
    /// bytes, and verify `sig` against the public key implied by `issuer`.
    pub fn verify(&self) -> Result<(), ClawError> {
        let issuer_pubkey = public_key_from_did(&self.issuer).map_err(|e| ClawError::Identity(e.to_string()))?;
        let claimed_pubkey = decode_multibase_ed25519(&self.public_key)
            .ok_or_else(|| ClawError::BadCanonicalForm("pub is not valid multibase ed25519".into()))?;
        if issuer_pubkey != claimed_pubkey {
            return Err(ClawError::IssuerPublicKeyMismatch);
        }

        let skeleton = json!({
            "v": self.v,
            "type": self.kind,
            "issuer": self.issuer.0,
            "pub": self.public_key,
            "ts": self.ts,
            "nonce": self.nonce,
            "prev": self.prev.as_ref().map(EventHash::to_hex),
            "payload": self.payload,
            "sig": "",
            "hash": "",
        });
        let hash_bytes = claw_crypto::jcs::canonicalize(&skeleton)?;
        let recomputed_hash = EventHash::from_bytes(claw_crypto::hash::sha256(&hash_bytes));
        if recomputed_hash != self.hash {
            return Err(ClawError::HashMismatch {
                claimed: self.hash.to_hex(),
                recomputed: recomputed_hash.to_hex(),
            });
        }

        let with_hash = {
            let mut v = skeleton;
            v["hash"] = json!(self.hash.to_hex());
            v
        };
        let signing_bytes = claw_crypto::jcs::canonicalize(&with_hash)?;
        let sig_bytes = hex::decode(&self.sig)
            .map_err(|_| ClawError::BadCanonicalForm("sig is not valid hex".into()))?;
        let ok = claw_crypto::keypair::verify(&claimed_pubkey, &signing_bytes, &sig_bytes)?;
        if !ok {
            return Err(ClawError::SignatureMismatch {
                issuer: self.issuer.0.clone(),
            });
        }
        Ok(())
    }

    /// The canonical bytes of this envelope as it would be re-serialized —
    /// used by relays to assert byte-identity (§6.2) and by the log to store
    /// the durable `(hash, bytes)` pair (§4.5).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, ClawError> {
        let v = json!({
            "v": self.v,
            "type": self.kind,
            "issuer": self.issuer.0,
            "pub": self.public_key,
            "ts": self.ts,
            "nonce": self.nonce,
            "prev": self.prev.as_ref().map(EventHash::to_hex),
            "payload": self.payload,
            "sig": self.sig,
            "hash": self.hash.to_hex(),
        });
        Ok(claw_crypto::jcs::canonicalize(&v)?)
    }
}

fn multibase_ed25519(public_key: &[u8; 32]) -> String {
    format!("z{}", bs58::encode(public_key).into_string())
}

fn decode_multibase_ed25519(s: &str) -> Option<[u8; 32]> {
    let rest = s.strip_prefix('z')?;
    let bytes = bs58::decode(rest).into_vec().ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::did_from_public_key;

    fn signed_envelope(kind: &str, nonce: Nonce, prev: Option<EventHash>, payload: Value) -> Envelope {
        let kp = claw_crypto::KeyPair::generate();
        let pk = kp.public_key_bytes();
        let did = did_from_public_key(&pk);
        Envelope::build(kind, did, &pk, nonce, prev, payload, 1_700_000_000_000, |bytes| kp.sign(bytes)).unwrap()
    }

    #[test]
    fn built_envelope_verifies() {
        let env = signed_envelope("wallet.transfer", 1, None, json!({"to": "clawXYZ", "amount": "500"}));
        env.verify().unwrap();
    }

    #[test]
    fn tampered_payload_fails_hash_check() {
        let mut env = signed_envelope("wallet.transfer", 1, None, json!({"to": "clawXYZ", "amount": "500"}));
        env.payload = json!({"to": "clawXYZ", "amount": "999999"});
        assert!(matches!(env.verify(), Err(ClawError::HashMismatch { .. })));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let mut env = signed_envelope("wallet.transfer", 1, None, json!({"to": "clawXYZ", "amount": "500"}));
        // Recompute hash to match tampered payload so only the signature check fires.
        env.payload = json!({"to": "clawXYZ", "amount": "999999"});
        let skeleton = json!({
            "v": env.v, "type": env.kind, "issuer": env.issuer.0, "pub": env.public_key,
            "ts": env.ts, "nonce": env.nonce, "prev": env.prev.as_ref().map(EventHash::to_hex),
            "payload": env.payload, "sig": "", "hash": "",
        });
        let bytes = claw_crypto::jcs::canonicalize(&skeleton).unwrap();
        env.hash = EventHash::from_bytes(claw_crypto::hash::sha256(&bytes));
        assert!(matches!(env.verify(), Err(ClawError::SignatureMismatch { .. })));
    }
}
