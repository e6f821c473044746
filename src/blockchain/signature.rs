use ed25519_dalek::{Signature, Signer, Verifier};

use super::crypto::{sha256_hex, CryptoError, DigitalSignature, KeyMaterial, PublicKey};

/// Produces and checks authentication tags over payload bytes
pub trait SignatureScheme {
    /// Signs a payload with the given key material
    fn sign(&self, payload: &[u8], key: &KeyMaterial) -> DigitalSignature;

    /// Checks a tag produced by [`SignatureScheme::sign`] with the same key
    fn verify(&self, payload: &[u8], signature: &DigitalSignature, key: &KeyMaterial) -> bool;
}

/// Ed25519 signatures, encoded in base58.
///
/// This is the scheme the ledger admits transactions with: the verifying
/// half of the key travels with the transaction, so anyone can verify.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Scheme;

impl SignatureScheme for Ed25519Scheme {
    fn sign(&self, payload: &[u8], key: &KeyMaterial) -> DigitalSignature {
        let signature = key.signing_key().sign(payload);
        DigitalSignature(bs58::encode(signature.to_bytes()).into_string())
    }

    fn verify(&self, payload: &[u8], signature: &DigitalSignature, key: &KeyMaterial) -> bool {
        verify_signature(payload, signature, &key.public_key()).unwrap_or(false)
    }
}

/// Shared-secret authentication tag: `H(hex(H(payload)) ++ hex(key))`.
///
/// Verification needs the signer's own key material, so a third party cannot
/// authenticate a tag. Kept for compatibility with tags produced by older
/// wallets; the ledger never admits transactions with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SharedSecretTag;

impl SignatureScheme for SharedSecretTag {
    fn sign(&self, payload: &[u8], key: &KeyMaterial) -> DigitalSignature {
        let payload_digest = sha256_hex(payload);
        let combined = format!("{}{}", payload_digest, key.to_hex());

        DigitalSignature(sha256_hex(combined.as_bytes()))
    }

    fn verify(&self, payload: &[u8], signature: &DigitalSignature, key: &KeyMaterial) -> bool {
        self.sign(payload, key) == *signature
    }
}

/// Decodes a base58 ed25519 signature
fn decode_signature(signature: &DigitalSignature) -> Result<Signature, CryptoError> {
    let bytes = bs58::decode(&signature.0)
        .into_vec()
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

    let signature_bytes: [u8; 64] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidSignature("Invalid signature length".to_string())
    })?;

    Ok(Signature::from_bytes(&signature_bytes))
}

/// Verifies an ed25519 signature against a message and public key
///
/// # Arguments
///
/// * `message` - The signed payload
/// * `signature` - The base58 signature
/// * `public_key` - The signer's base58 verifying key
///
/// # Returns
///
/// `Ok(false)` for a well-formed signature that does not verify, an error
/// when the key or signature cannot be decoded
pub fn verify_signature(
    message: &[u8],
    signature: &DigitalSignature,
    public_key: &PublicKey,
) -> Result<bool, CryptoError> {
    let verifying_key = public_key.to_verifying_key()?;
    let signature = decode_signature(signature)?;

    Ok(verifying_key.verify(message, &signature).is_ok())
}
