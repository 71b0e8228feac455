use bip39::Mnemonic;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Derive a 64-byte seed from a BIP-39 mnemonic phrase and optional passphrase.
pub fn bip39_mnemonic_to_seed(
    phrase: &str,
    passphrase: &str,
) -> Result<Zeroizing<[u8; 64]>, CryptoError> {
    let mnemonic = phrase
        .parse::<Mnemonic>()
        .map_err(|e| CryptoError::BadMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

/// Generate a fresh 24-word (256-bit) BIP-39 mnemonic.
pub fn generate_mnemonic() -> Mnemonic {
    Mnemonic::generate(24).expect("24 is a valid BIP-39 word count")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_derivation_is_deterministic() {
        let m = generate_mnemonic();
        let phrase = m.to_string();
        let seed_a = bip39_mnemonic_to_seed(&phrase, "").unwrap();
        let seed_b = bip39_mnemonic_to_seed(&phrase, "").unwrap();
        assert_eq!(*seed_a, *seed_b);
    }

    #[test]
    fn different_passphrase_changes_seed() {
        let m = generate_mnemonic();
        let phrase = m.to_string();
        let seed_a = bip39_mnemonic_to_seed(&phrase, "one").unwrap();
        let seed_b = bip39_mnemonic_to_seed(&phrase, "two").unwrap();
        assert_ne!(*seed_a, *seed_b);
    }
}
