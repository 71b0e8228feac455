use sharks::{Share, Sharks};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Split `secret` into `shares` shares, any `threshold` of which reconstruct it.
pub fn shamir_split(
    secret: &[u8],
    threshold: u8,
    shares: u8,
) -> Result<Vec<Vec<u8>>, CryptoError> {
    if threshold == 0 || threshold > shares {
        return Err(CryptoError::BadShamirParams);
    }
    let sharks = Sharks(threshold);
    let dealer = sharks.dealer(secret);
    Ok(dealer.take(shares as usize).map(|s| Vec::from(&s)).collect())
}

/// Reconstruct the original secret from at least `threshold` shares.
pub fn shamir_combine(share_bytes: &[Vec<u8>], threshold: u8) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let sharks = Sharks(threshold);
    let shares: Result<Vec<Share>, _> = share_bytes
        .iter()
        .map(|b| Share::try_from(b.as_slice()))
        .collect();
    let shares = shares.map_err(|_| CryptoError::ShamirRecoverFailed)?;
    sharks
        .recover(shares.as_slice())
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::ShamirRecoverFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_then_combine_recovers_secret() {
        let secret = b"treasury multisig backup key material";
        let shares = shamir_split(secret, 3, 5).unwrap();
        let recovered = shamir_combine(&shares[1..4].to_vec(), 3).unwrap();
        assert_eq!(&*recovered, secret);
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        assert!(shamir_split(b"x", 6, 5).is_err());
    }
}
