use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use utoipa::ToSchema;

use std::fmt;
use std::str::FromStr;

/// Fixed textual prefix of every address
pub const ADDRESS_PREFIX: &str = "SPW";

/// Width of each hexadecimal address segment
const SEGMENT_LEN: usize = 8;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid seed phrase: {0}")]
    InvalidSeedPhrase(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Computes the SHA-256 digest of a byte sequence
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Computes the SHA-256 digest of a byte sequence as 64 lowercase hex characters
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Represents a wallet address (`SPW-xxxxxxxx-xxxxxxxx-xxxxxxxx`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Address(pub String);

impl Address {
    /// Returns the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Syntactic check of the address format, see [`is_valid_address`]
    pub fn is_valid(&self) -> bool {
        is_valid_address(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    /// Parses an address in its wire format, which also requires the three
    /// segments to be lowercase hexadecimal
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !is_valid_address(s) {
            return Err(CryptoError::InvalidAddress(format!(
                "{} (expected {}-xxxxxxxx-xxxxxxxx-xxxxxxxx)",
                s, ADDRESS_PREFIX
            )));
        }

        let lowercase_hex = s
            .split('-')
            .skip(1)
            .all(|segment| segment.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));

        if !lowercase_hex {
            return Err(CryptoError::InvalidAddress(format!(
                "{} (segments must be lowercase hexadecimal)",
                s
            )));
        }

        Ok(Address(s.to_string()))
    }
}

/// Checks that a string has the shape of an address: four dash-delimited
/// segments, the first equal to [`ADDRESS_PREFIX`] and the remaining three
/// exactly 8 characters each.
///
/// This does not verify that the address was ever derived from a key.
pub fn is_valid_address(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();

    parts.len() == 4
        && parts[0] == ADDRESS_PREFIX
        && parts[1..].iter().all(|part| part.chars().count() == SEGMENT_LEN)
}

/// A public verifying key in base58 format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PublicKey(pub String);

impl PublicKey {
    /// Creates a new public key from an ed25519 verifying key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        PublicKey(bs58::encode(key.as_bytes()).into_string())
    }

    /// Converts the public key back into an ed25519 verifying key
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Derives the address belonging to this public key
    pub fn to_address(&self) -> Result<Address, CryptoError> {
        Ok(address_from_verifying_key(&self.to_verifying_key()?))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a signature or authentication tag over a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DigitalSignature(pub String);

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Secret key material derived from a seed phrase.
///
/// The 32 bytes are the seed digest; they double as the ed25519 secret key.
/// Key material never leaves the wallet that derived it, so `Debug` is redacted.
#[derive(Clone)]
pub struct KeyMaterial {
    secret: [u8; 32],
    signing_key: SigningKey,
}

impl KeyMaterial {
    fn from_secret(secret: [u8; 32]) -> Self {
        KeyMaterial {
            secret,
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    /// The textual form of the key (lowercase hex), as fed to the shared-secret tag
    pub fn to_hex(&self) -> String {
        hex::encode(self.secret)
    }

    /// The ed25519 signing key
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The ed25519 verifying key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The public half of the key in its wire format
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(&self.verifying_key())
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.secret == other.secret
    }
}

impl Eq for KeyMaterial {}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &self.public_key().0)
            .finish_non_exhaustive()
    }
}

/// Derives key material from a seed phrase
///
/// # Arguments
///
/// * `seed_phrase` - The human-memorable seed phrase
///
/// # Returns
///
/// The SHA-256 digest of the phrase's UTF-8 bytes wrapped as key material
pub fn derive_key(seed_phrase: &str) -> Result<KeyMaterial, CryptoError> {
    if seed_phrase.trim().is_empty() {
        return Err(CryptoError::InvalidSeedPhrase(
            "Seed phrase must not be empty".to_string(),
        ));
    }

    Ok(KeyMaterial::from_secret(sha256(seed_phrase.as_bytes())))
}

/// Derives the display address of a key.
///
/// The address is computed from the public half so that anyone holding a
/// transaction's public key can check it against the sender address.
pub fn derive_address(key: &KeyMaterial) -> Address {
    address_from_verifying_key(&key.verifying_key())
}

fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let digest = sha256_hex(key.as_bytes());

    Address(format!(
        "{}-{}-{}-{}",
        ADDRESS_PREFIX,
        &digest[0..SEGMENT_LEN],
        &digest[SEGMENT_LEN..2 * SEGMENT_LEN],
        &digest[2 * SEGMENT_LEN..3 * SEGMENT_LEN],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(sha256_hex(b"").len(), 64);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_key("alpha bravo charlie").unwrap();
        let second = derive_key("alpha bravo charlie").unwrap();

        assert_eq!(first, second);
        assert_eq!(derive_address(&first), derive_address(&second));
    }

    #[test]
    fn test_different_seeds_give_different_addresses() {
        let a = derive_address(&derive_key("alpha").unwrap());
        let b = derive_address(&derive_key("bravo").unwrap());

        assert_ne!(a, b);
    }

    #[test]
    fn test_key_is_seed_digest() {
        let key = derive_key("creator-wallet-seed-phrase").unwrap();
        assert_eq!(key.to_hex(), sha256_hex(b"creator-wallet-seed-phrase"));
    }

    #[test]
    fn test_derived_address_format() {
        let address = derive_address(&derive_key("golf hotel india").unwrap());

        assert!(address.is_valid());
        assert!(address.as_str().starts_with("SPW-"));
        assert_eq!(address.as_str().len(), 3 + 3 * 9);
        assert!(address.as_str().parse::<Address>().is_ok());
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert!(matches!(derive_key(""), Err(CryptoError::InvalidSeedPhrase(_))));
        assert!(matches!(derive_key("   "), Err(CryptoError::InvalidSeedPhrase(_))));
    }

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("SPW-1a2b3c4d-5e6f7a8b-9c0d1e2f"));
        assert!(is_valid_address("SPW-11111111-11111111-11111111"));

        // Syntactic only: segment contents are not checked
        assert!(is_valid_address("SPW-zzzzzzzz-ZZZZZZZZ-........"));

        assert!(!is_valid_address("SPW-CREATOR-00000000-00000000"));
        assert!(!is_valid_address("XYZ-1a2b3c4d-5e6f7a8b-9c0d1e2f"));
        assert!(!is_valid_address("SPW-1a2b3c4d-5e6f7a8b"));
        assert!(!is_valid_address("SPW-1a2b3c4d-5e6f7a8b-9c0d1e2f-00000000"));
        assert!(!is_valid_address("SPW-1a2b3c4-5e6f7a8b-9c0d1e2f"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn test_address_from_str_requires_lowercase_hex() {
        assert!("SPW-1a2b3c4d-5e6f7a8b-9c0d1e2f".parse::<Address>().is_ok());
        assert!("SPW-1A2B3C4D-5e6f7a8b-9c0d1e2f".parse::<Address>().is_err());
        assert!("SPW-zzzzzzzz-5e6f7a8b-9c0d1e2f".parse::<Address>().is_err());
    }

    #[test]
    fn test_public_key_round_trip() {
        let key = derive_key("kilo lima mike").unwrap();
        let public_key = key.public_key();

        let verifying_key = public_key.to_verifying_key().unwrap();
        assert_eq!(verifying_key, key.verifying_key());
        assert_eq!(public_key.to_address().unwrap(), derive_address(&key));
    }

    #[test]
    fn test_key_material_debug_is_redacted() {
        let key = derive_key("secret words").unwrap();
        let debug = format!("{:?}", key);

        assert!(!debug.contains(&key.to_hex()));
    }
}
