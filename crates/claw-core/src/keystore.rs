//! Passphrase-encrypted Ed25519 private key storage (C3, §4.3). The keystore
//! never returns the raw private key; signing happens inside this module.
//! Grounded on the per-account locking discipline in
//! `chronx-recovery` and the `{id, pub, kdf, enc}` record shape described
//! in §4.3.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use claw_crypto::kdf::Argon2Params;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("wrong passphrase")]
    BadPassphrase,
    #[error("key record not found: {0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("malformed key record: {0}")]
    Malformed(String),
    #[error("cryptography error: {0}")]
    Crypto(#[from] claw_crypto::CryptoError),
}

#[derive(Debug, Serialize, Deserialize)]
struct KdfRecord {
    salt: String,
    t: u32,
    m: u32,
    p: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncRecord {
    alg: String,
    nonce: String,
    ciphertext: String,
    tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyRecord {
    id: String,
    #[serde(rename = "pub")]
    public_key: String,
    kdf: KdfRecord,
    enc: EncRecord,
}

/// A passphrase-encrypted Ed25519 key store directory. One JSON record per
/// key id under `<dir>/<keyId>.json`. Access is serialized per key id with a
/// per-key lock (§5 Shared resources).
pub struct Keystore {
    dir: PathBuf,
    locked: Mutex<HashSet<String>>,
    cond: Condvar,
}

impl Keystore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, KeyError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| KeyError::Storage(e.to_string()))?;
        Ok(Self {
            dir,
            locked: Mutex::new(HashSet::new()),
            cond: Condvar::new(),
        })
    }

    fn record_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.json"))
    }

    /// Generate a fresh Ed25519 keypair and persist it encrypted under `key_id`.
    pub fn create(&self, key_id: &str, passphrase: &str) -> Result<[u8; 32], KeyError> {
        let _guard = self.lock(key_id);
        let kp = claw_crypto::KeyPair::generate();
        let public_key = kp.public_key_bytes();
        self.save(key_id, &public_key, &*kp.seed_bytes(), passphrase)?;
        Ok(public_key)
    }

    fn save(
        &self,
        key_id: &str,
        public_key: &[u8; 32],
        secret_seed: &[u8; 32],
        passphrase: &str,
    ) -> Result<(), KeyError> {
        let mut salt = [0u8; 16];
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(&mut salt);
        let params = Argon2Params::default();
        let kek = claw_crypto::kdf::argon2id(passphrase.as_bytes(), &salt, params, 32)?;
        let kek: [u8; 32] = (*kek).clone().try_into().expect("32-byte kek");

        let nonce = claw_crypto::aead::random_nonce();
        let ad = associated_data(key_id, public_key);
        let sealed = claw_crypto::aead::seal(&kek, &nonce, &ad, secret_seed)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - 16);

        let record = KeyRecord {
            id: key_id.to_string(),
            public_key: hex::encode(public_key),
            kdf: KdfRecord {
                salt: hex::encode(salt),
                t: params.t,
                m: params.m,
                p: params.p,
            },
            enc: EncRecord {
                alg: "aes-256-gcm".to_string(),
                nonce: hex::encode(nonce),
                ciphertext: hex::encode(ciphertext),
                tag: hex::encode(tag),
            },
        };
        let bytes = serde_json::to_vec_pretty(&record).map_err(|e| KeyError::Malformed(e.to_string()))?;
        std::fs::write(self.record_path(key_id), bytes).map_err(|e| KeyError::Storage(e.to_string()))?;
        Ok(())
    }

    fn load_record(&self, key_id: &str) -> Result<KeyRecord, KeyError> {
        let path = self.record_path(key_id);
        if !path.exists() {
            return Err(KeyError::NotFound(key_id.to_string()));
        }
        let bytes = std::fs::read(path).map_err(|e| KeyError::Storage(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))
    }

    fn unseal(&self, record: &KeyRecord, passphrase: &str) -> Result<[u8; 32], KeyError> {
        let salt = hex::decode(&record.kdf.salt).map_err(|e| KeyError::Malformed(e.to_string()))?;
        let params = Argon2Params {
            t: record.kdf.t,
            m: record.kdf.m,
            p: record.kdf.p,
        };
        let kek = claw_crypto::kdf::argon2id(passphrase.as_bytes(), &salt, params, 32)?;
        let kek: [u8; 32] = (*kek).clone().try_into().expect("32-byte kek");

        let nonce: [u8; 12] = hex::decode(&record.enc.nonce)
            .map_err(|e| KeyError::Malformed(e.to_string()))?
            .try_into()
            .map_err(|_| KeyError::Malformed("bad nonce length".into()))?;
        let ciphertext = hex::decode(&record.enc.ciphertext).map_err(|e| KeyError::Malformed(e.to_string()))?;
        let tag = hex::decode(&record.enc.tag).map_err(|e| KeyError::Malformed(e.to_string()))?;
        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let public_key: [u8; 32] = hex::decode(&record.public_key)
            .map_err(|e| KeyError::Malformed(e.to_string()))?
            .try_into()
            .map_err(|_| KeyError::Malformed("bad public key length".into()))?;
        let ad = associated_data(&record.id, &public_key);

        let seed = claw_crypto::aead::open(&kek, &nonce, &ad, &sealed).map_err(|_| KeyError::BadPassphrase)?;
        seed.try_into().map_err(|_| KeyError::Malformed("bad seed length".into()))
    }

    /// Return the public key for `key_id` without touching the passphrase.
    pub fn public_key(&self, key_id: &str) -> Result<[u8; 32], KeyError> {
        let record = self.load_record(key_id)?;
        hex::decode(&record.public_key)
            .map_err(|e| KeyError::Malformed(e.to_string()))?
            .try_into()
            .map_err(|_| KeyError::Malformed("bad public key length".into()))
    }

    /// Decrypt the key and sign `signing_bytes`. The raw seed never leaves
    /// this function's stack frame.
    pub fn sign(&self, key_id: &str, passphrase: &str, signing_bytes: &[u8]) -> Result<[u8; 64], KeyError> {
        let _guard = self.lock(key_id);
        let record = self.load_record(key_id)?;
        let seed = self.unseal(&record, passphrase)?;
        Ok(claw_crypto::keypair::sign(&seed, signing_bytes))
    }

    /// Block until `key_id` is uncontended, then hold it locked until the
    /// returned guard drops. Other key ids are unaffected.
    fn lock(&self, key_id: &str) -> KeyGuard<'_> {
        let mut locked = self.locked.lock().unwrap();
        while locked.contains(key_id) {
            locked = self.cond.wait(locked).unwrap();
        }
        locked.insert(key_id.to_string());
        KeyGuard { keystore: self, key_id: key_id.to_string() }
    }
}

struct KeyGuard<'a> {
    keystore: &'a Keystore,
    key_id: String,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut locked = self.keystore.locked.lock().unwrap();
        locked.remove(&self.key_id);
        self.keystore.cond.notify_all();
    }
}

fn associated_data(key_id: &str, public_key: &[u8; 32]) -> Vec<u8> {
    let v = json!({ "id": key_id, "pub": hex::encode(public_key) });
    claw_crypto::jcs::canonicalize(&v).expect("associated data is always canonicalizable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_sign_round_trips() {
        let dir = tempdir();
        let ks = Keystore::open(&dir).unwrap();
        let pk = ks.create("agent-1", "correct horse").unwrap();
        let sig = ks.sign("agent-1", "correct horse", b"message").unwrap();
        assert!(claw_crypto::keypair::verify(&pk, b"message", &sig).unwrap());
    }

    #[test]
    fn wrong_passphrase_is_rejected() {
        let dir = tempdir();
        let ks = Keystore::open(&dir).unwrap();
        ks.create("agent-1", "correct horse").unwrap();
        let err = ks.sign("agent-1", "wrong horse", b"message").unwrap_err();
        assert!(matches!(err, KeyError::BadPassphrase));
    }

    fn tempdir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("claw-keystore-test-{}-{}", std::process::id(), nanos));
        p
    }
}
