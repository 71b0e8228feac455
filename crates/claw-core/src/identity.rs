//! DID and address derivation (C2, §4.2). Both are total, reversible
//! functions of an Ed25519 public key; the address additionally carries a
//! 4-byte checksum that MUST verify on decode.

use thiserror::Error;

use crate::types::{Address, Did};

const DID_PREFIX: &str = "did:claw:z";
const ADDRESS_PREFIX: &str = "claw";
const ADDRESS_VERSION: u8 = 0x00;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("malformed DID or address")]
    Malformed,
    #[error("address checksum does not verify")]
    BadChecksum,
}

pub fn did_from_public_key(public_key: &[u8; 32]) -> Did {
    Did(format!("{DID_PREFIX}{}", bs58::encode(public_key).into_string()))
}

pub fn public_key_from_did(did: &Did) -> Result<[u8; 32], IdentityError> {
    let rest = did.0.strip_prefix(DID_PREFIX).ok_or(IdentityError::Malformed)?;
    let bytes = bs58::decode(rest).into_vec().map_err(|_| IdentityError::Malformed)?;
    bytes.try_into().map_err(|_| IdentityError::Malformed)
}

pub fn address_from_public_key(public_key: &[u8; 32]) -> Address {
    let hash = claw_crypto::hash::sha256(public_key);
    let mut payload = Vec::with_capacity(1 + 32 + 4);
    payload.push(ADDRESS_VERSION);
    payload.extend_from_slice(public_key);
    payload.extend_from_slice(&hash[..4]);
    Address(format!("{ADDRESS_PREFIX}{}", bs58::encode(&payload).into_string()))
}

pub fn public_key_from_address(address: &Address) -> Result<[u8; 32], IdentityError> {
    let rest = address
        .0
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or(IdentityError::Malformed)?;
    let payload = bs58::decode(rest).into_vec().map_err(|_| IdentityError::Malformed)?;
    if payload.len() != 1 + 32 + 4 {
        return Err(IdentityError::Malformed);
    }
    if payload[0] != ADDRESS_VERSION {
        return Err(IdentityError::Malformed);
    }
    let public_key: [u8; 32] = payload[1..33].try_into().map_err(|_| IdentityError::Malformed)?;
    let expected_checksum = &claw_crypto::hash::sha256(&public_key)[..4];
    if &payload[33..37] != expected_checksum {
        return Err(IdentityError::BadChecksum);
    }
    Ok(public_key)
}

/// `did → address`, the composition of `public_key_from_did` and
/// `address_from_public_key`. Total on well-formed DIDs.
pub fn address_from_did(did: &Did) -> Result<Address, IdentityError> {
    let pk = public_key_from_did(did)?;
    Ok(address_from_public_key(&pk))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pubkey() -> [u8; 32] {
        let kp = claw_crypto::KeyPair::generate();
        kp.public_key_bytes()
    }

    #[test]
    fn did_round_trips() {
        let pk = sample_pubkey();
        let did = did_from_public_key(&pk);
        assert!(did.0.starts_with(DID_PREFIX));
        assert_eq!(public_key_from_did(&did).unwrap(), pk);
    }

    #[test]
    fn address_round_trips() {
        let pk = sample_pubkey();
        let addr = address_from_public_key(&pk);
        assert!(addr.0.starts_with(ADDRESS_PREFIX));
        assert_eq!(public_key_from_address(&addr).unwrap(), pk);
    }

    #[test]
    fn tampered_address_checksum_is_rejected() {
        let pk = sample_pubkey();
        let addr = address_from_public_key(&pk);
        let mut corrupted = addr.0.clone();
        corrupted.push('z');
        let corrupted = Address(corrupted);
        assert!(public_key_from_address(&corrupted).is_err());
    }

    #[test]
    fn address_from_did_is_total_on_wellformed_dids() {
        let pk = sample_pubkey();
        let did = did_from_public_key(&pk);
        let addr = address_from_did(&did).unwrap();
        assert_eq!(addr, address_from_public_key(&pk));
    }

    #[test]
    fn malformed_did_is_rejected() {
        let did = Did("not-a-did".to_string());
        assert_eq!(public_key_from_did(&did).unwrap_err(), IdentityError::Malformed);
    }
}
