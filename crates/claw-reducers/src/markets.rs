//! Markets reducer (§4.8.4): listing/bid/delivery acceptance graph shared by
//! the info, task, and capability listing kinds. Grounded on `chronx-state`'s
//! multi-entity staged-mutation style, generalized from account/timelock
//! pairs to the listing→bid→escrow→delivery graph.

use claw_core::error::ClawError;
use claw_core::identity::address_from_did;
use claw_core::types::Address;
use claw_core::Envelope;

use crate::payload::{get_field, get_str, get_str_opt, parse_amount};
use crate::state::{Bid, BidStatus, Delivery, DeliveryStatus, Escrow, EscrowState, Listing, ListingKind, ListingStatus, State};

fn parse_x25519_hex(payload: &serde_json::Value, field: &str) -> Result<[u8; 32], ClawError> {
    let s = get_str(payload, field)?;
    let bytes = hex::decode(s).map_err(|_| ClawError::SchemaViolation(format!("`{field}` must be hex")))?;
    claw_crypto::x25519::parse_public_key(&bytes)
        .map_err(|_| ClawError::SchemaViolation(format!("`{field}` must be a 32-byte X25519 public key")))
}

fn parse_content_hash(payload: &serde_json::Value) -> Result<String, ClawError> {
    let s = get_str(payload, "contentHash")?;
    let bytes = hex::decode(s).map_err(|_| ClawError::SchemaViolation("`contentHash` must be hex".into()))?;
    if bytes.len() != 32 {
        return Err(ClawError::SchemaViolation("`contentHash` must be a 32-byte sha256 digest".into()));
    }
    Ok(s.to_string())
}

fn issuer_address(env: &Envelope) -> Result<Address, ClawError> {
    address_from_did(&env.issuer).map_err(|e| ClawError::Identity(e.to_string()))
}

fn parse_kind(s: &str) -> Result<ListingKind, ClawError> {
    match s {
        "info" => Ok(ListingKind::Info),
        "task" => Ok(ListingKind::Task),
        "capability" => Ok(ListingKind::Capability),
        other => Err(ClawError::SchemaViolation(format!("unknown listing kind `{other}`"))),
    }
}

fn require_listing<'a>(state: &'a State, id: &str) -> Result<&'a Listing, ClawError> {
    state.listings.get(id).ok_or_else(|| ClawError::NotFound { kind: "listing".into(), id: id.into() })
}

fn require_bid<'a>(state: &'a State, id: &str) -> Result<&'a Bid, ClawError> {
    state.bids.get(id).ok_or_else(|| ClawError::NotFound { kind: "bid".into(), id: id.into() })
}

pub fn can_apply(state: &State, env: &Envelope) -> Result<(), ClawError> {
    match env.kind.as_str() {
        "listing.publish" => {
            let id = get_str(&env.payload, "id")?;
            if state.listings.contains_key(id) {
                return Err(ClawError::DuplicateCreate(id.into()));
            }
            let kind = parse_kind(get_str(&env.payload, "kind")?)?;
            let seller = issuer_address(env)?;
            let stated = Address(get_str(&env.payload, "seller")?.to_string());
            if seller != stated {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: id.into() });
            }
            if matches!(kind, ListingKind::Info) {
                parse_content_hash(&env.payload)?;
            }
            Ok(())
        }
        "listing.remove" => {
            let listing = require_listing(state, get_str(&env.payload, "id")?)?;
            let seller = issuer_address(env)?;
            if listing.seller != seller {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: listing.id.clone() });
            }
            if !matches!(listing.status, ListingStatus::Active) {
                return Err(ClawError::AlreadyTerminal(listing.id.clone()));
            }
            Ok(())
        }
        "bid.submit" => {
            let listing_id = get_str(&env.payload, "listingId")?;
            let listing = require_listing(state, listing_id)?;
            if !matches!(listing.status, ListingStatus::Active) {
                return Err(ClawError::InvalidTransition { from: "non-Active".into(), event: env.kind.clone() });
            }
            let id = get_str(&env.payload, "id")?;
            if state.bids.contains_key(id) {
                return Err(ClawError::DuplicateCreate(id.into()));
            }
            let amount = parse_amount(get_field(&env.payload, "amount")?, "amount")?;
            if amount == 0 {
                return Err(ClawError::ZeroAmount);
            }
            if matches!(listing.kind, ListingKind::Info) {
                parse_x25519_hex(&env.payload, "buyerEphemeralPublicKey")?;
            }
            Ok(())
        }
        "bid.accept" => {
            let bid = require_bid(state, get_str(&env.payload, "id")?)?;
            let listing = require_listing(state, &bid.listing_id)?;
            let seller = issuer_address(env)?;
            if listing.seller != seller {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: listing.id.clone() });
            }
            if !matches!(listing.status, ListingStatus::Active) {
                return Err(ClawError::InvalidTransition { from: "non-Active".into(), event: env.kind.clone() });
            }
            if !matches!(bid.status, BidStatus::Open) {
                return Err(ClawError::InvalidTransition { from: "non-Open".into(), event: env.kind.clone() });
            }
            if matches!(listing.kind, ListingKind::Info) {
                if bid.buyer_ephemeral_public.is_none() {
                    return Err(ClawError::SchemaViolation(
                        "bid has no buyerEphemeralPublicKey to seal the content key against".into(),
                    ));
                }
                parse_x25519_hex(&env.payload, "sellerEphemeralPublicKey")?;
                get_str(&env.payload, "encryptedContentKey")?;
            }
            Ok(())
        }
        "delivery.submit" => {
            let listing_id = get_str(&env.payload, "listingId")?;
            let listing = require_listing(state, listing_id)?;
            if matches!(listing.kind, ListingKind::Info) {
                return Err(ClawError::SchemaViolation(
                    "info listings settle on bid.accept, they have no delivery cycle".into(),
                ));
            }
            if !matches!(listing.status, ListingStatus::Sold) {
                return Err(ClawError::InvalidTransition { from: "non-Sold".into(), event: env.kind.clone() });
            }
            let provider = issuer_address(env)?;
            if listing.seller != provider {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: listing.id.clone() });
            }
            if let Some(existing) = state.deliveries.get(get_str(&env.payload, "id")?) {
                if !matches!(existing.status, DeliveryStatus::Rejected) {
                    return Err(ClawError::DuplicateCreate(existing.id.clone()));
                }
            }
            Ok(())
        }
        "delivery.reject" => {
            let delivery = require_delivery(state, get_str(&env.payload, "id")?)?;
            let listing = require_listing(state, &delivery.listing_id)?;
            let buyer_ok = is_listing_buyer(state, listing, env)?;
            if !buyer_ok {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: delivery.id.clone() });
            }
            if !matches!(delivery.status, DeliveryStatus::Submitted) {
                return Err(ClawError::AlreadyTerminal(delivery.id.clone()));
            }
            Ok(())
        }
        "delivery.confirm" => {
            let delivery = require_delivery(state, get_str(&env.payload, "id")?)?;
            let listing = require_listing(state, &delivery.listing_id)?;
            let buyer_ok = is_listing_buyer(state, listing, env)?;
            if !buyer_ok {
                return Err(ClawError::Unauthorized { issuer: env.issuer.0.clone(), resource: delivery.id.clone() });
            }
            if !matches!(delivery.status, DeliveryStatus::Submitted) {
                return Err(ClawError::AlreadyTerminal(delivery.id.clone()));
            }
            Ok(())
        }
        other => Err(ClawError::SchemaViolation(format!("unknown market event `{other}`"))),
    }
}

fn require_delivery<'a>(state: &'a State, id: &str) -> Result<&'a Delivery, ClawError> {
    state.deliveries.get(id).ok_or_else(|| ClawError::NotFound { kind: "delivery".into(), id: id.into() })
}

/// The buyer of `listing` is the address behind the accepted bid.
fn is_listing_buyer(state: &State, listing: &Listing, env: &Envelope) -> Result<bool, ClawError> {
    let bid_id = listing
        .accepted_bid
        .as_ref()
        .ok_or_else(|| ClawError::Conflict("listing has no accepted bid".into()))?;
    let bid = require_bid(state, bid_id)?;
    Ok(bid.bidder == issuer_address(env)?)
}

pub fn apply(state: &mut State, env: &Envelope) -> Result<(), ClawError> {
    can_apply(state, env)?;
    match env.kind.as_str() {
        "listing.publish" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let kind = parse_kind(get_str(&env.payload, "kind")?)?;
            let seller = issuer_address(env)?;
            let metadata = env.payload.get("metadata").cloned().unwrap_or(serde_json::Value::Null);
            let pricing = env.payload.get("pricing").cloned().unwrap_or(serde_json::Value::Null);
            let content_hash = if matches!(kind, ListingKind::Info) {
                Some(parse_content_hash(&env.payload)?)
            } else {
                None
            };
            state.listings.insert(
                id.clone(),
                Listing {
                    id,
                    seller,
                    kind,
                    metadata,
                    pricing,
                    status: ListingStatus::Active,
                    accepted_bid: None,
                    content_hash,
                    encrypted_content_key: None,
                    seller_ephemeral_public: None,
                    last_event_hash: env.hash,
                },
            );
        }
        "listing.remove" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let listing = state.listings.get_mut(&id).unwrap();
            listing.status = ListingStatus::Withdrawn;
            listing.last_event_hash = env.hash;
        }
        "bid.submit" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let listing_id = get_str(&env.payload, "listingId")?.to_string();
            let bidder = issuer_address(env)?;
            let amount = parse_amount(get_field(&env.payload, "amount")?, "amount")?;
            let buyer_ephemeral_public = get_str_opt(&env.payload, "buyerEphemeralPublicKey").map(|s| s.to_string());
            state.bids.insert(
                id.clone(),
                Bid { id, listing_id, bidder, amount, status: BidStatus::Open, buyer_ephemeral_public },
            );
        }
        "bid.accept" => {
            let bid_id = get_str(&env.payload, "id")?.to_string();
            let (listing_id, amount, bidder) = {
                let bid = state.bids.get(&bid_id).unwrap();
                (bid.listing_id.clone(), bid.amount, bid.bidder.clone())
            };
            let (seller, kind) = {
                let listing = state.listings.get(&listing_id).unwrap();
                (listing.seller.clone(), listing.kind)
            };

            let buyer_wallet = state.wallet(&bidder);
            if buyer_wallet.available < amount {
                return Err(ClawError::InsufficientBalance { need: amount, have: buyer_wallet.available });
            }

            if matches!(kind, ListingKind::Info) {
                // Info listings have no milestone/delivery cycle: the
                // encrypted content key IS the delivery, so payment settles
                // immediately instead of moving through an escrow.
                state.wallet_mut(&bidder).available -= amount;
                state.wallet_mut(&seller).available += amount;
                state.wallet_mut(&seller).total_in += amount;

                let seller_ephemeral_public = get_str(&env.payload, "sellerEphemeralPublicKey")?.to_string();
                let encrypted_content_key = get_str(&env.payload, "encryptedContentKey")?.to_string();
                let listing = state.listings.get_mut(&listing_id).unwrap();
                listing.seller_ephemeral_public = Some(seller_ephemeral_public);
                listing.encrypted_content_key = Some(encrypted_content_key);
            } else {
                state.wallet_mut(&bidder).available -= amount;
                state.wallet_mut(&bidder).locked += amount;

                let escrow_id = format!("escrow:{bid_id}");
                let release_rules = match kind {
                    ListingKind::Task => "milestone-approval",
                    _ => "on-confirm",
                };
                state.escrows.insert(
                    escrow_id.clone(),
                    Escrow {
                        id: escrow_id,
                        depositor: bidder,
                        beneficiary: seller,
                        arbiter: None,
                        amount,
                        released_to_beneficiary: 0,
                        refunded_to_depositor: 0,
                        state: EscrowState::Active,
                        release_rules: release_rules.to_string(),
                        expires_at: None,
                        last_event_hash: env.hash,
                    },
                );
            }

            let bid = state.bids.get_mut(&bid_id).unwrap();
            bid.status = BidStatus::Accepted;
            let listing = state.listings.get_mut(&listing_id).unwrap();
            listing.status = ListingStatus::Sold;
            listing.accepted_bid = Some(bid_id);
            listing.last_event_hash = env.hash;
        }
        "delivery.submit" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let listing_id = get_str(&env.payload, "listingId")?.to_string();
            let listing = state.listings.get(&listing_id).unwrap();
            let bid_id = listing.accepted_bid.clone().expect("Sold listing has an accepted bid");
            let escrow_id = format!("escrow:{bid_id}");
            state.deliveries.insert(
                id.clone(),
                Delivery { id, listing_id, bid_id, status: DeliveryStatus::Submitted, escrow_id },
            );
        }
        "delivery.reject" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let delivery = state.deliveries.get_mut(&id).unwrap();
            delivery.status = DeliveryStatus::Rejected;
        }
        "delivery.confirm" => {
            let id = get_str(&env.payload, "id")?.to_string();
            let (escrow_id, amount, depositor, beneficiary) = {
                let delivery = state.deliveries.get(&id).unwrap();
                let escrow = state.escrows.get(&delivery.escrow_id).unwrap();
                let remaining = escrow.amount - escrow.released_to_beneficiary - escrow.refunded_to_depositor;
                (delivery.escrow_id.clone(), remaining, escrow.depositor.clone(), escrow.beneficiary.clone())
            };
            state.wallet_mut(&depositor).locked -= amount;
            state.wallet_mut(&beneficiary).available += amount;
            state.wallet_mut(&beneficiary).total_in += amount;
            let escrow = state.escrows.get_mut(&escrow_id).unwrap();
            escrow.released_to_beneficiary += amount;
            escrow.state = EscrowState::Released;
            let delivery = state.deliveries.get_mut(&id).unwrap();
            delivery.status = DeliveryStatus::Confirmed;
        }
        _ => unreachable!("validated above"),
    }
    Ok(())
}
