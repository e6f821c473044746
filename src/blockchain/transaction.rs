use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{Address, CryptoError, DigitalSignature, PublicKey};
use super::signature::verify_signature;
use super::wallet::Wallet;

/// Errors that can occur during transaction signing and verification
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction already signed")]
    AlreadySigned,

    #[error("Transaction not signed")]
    NotSigned,

    #[error("Transaction carries no public key")]
    MissingPublicKey,

    #[error("System-minted transactions are not signed")]
    SystemMinted,

    #[error("Signer {signer} does not match sender {sender}")]
    SignerMismatch { signer: Address, sender: Address },

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Represents a value transfer
///
/// Field order is part of the canonical block encoding and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Sender's address, `None` for system-minted value (rewards, genesis)
    pub from: Option<Address>,

    /// Recipient's address
    pub to: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Timestamp when the transaction was created
    #[schema(value_type = String, example = "2024-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// The sender's verifying key, set when the transaction is signed
    pub public_key: Option<PublicKey>,

    /// Ed25519 signature over the signing payload
    pub signature: Option<DigitalSignature>,
}

/// The signed part of a transaction: everything but the signature
#[derive(Serialize)]
struct SigningPayload<'a> {
    from: &'a Option<Address>,
    to: &'a Address,
    amount: f64,
    timestamp: &'a DateTime<Utc>,
    public_key: &'a Option<PublicKey>,
}

impl Transaction {
    /// Creates a new unsigned transfer
    ///
    /// # Arguments
    ///
    /// * `from` - The address of the sender
    /// * `to` - The address of the recipient
    /// * `amount` - The amount to transfer
    ///
    /// # Returns
    ///
    /// A new Transaction instance stamped with the current time
    pub fn new(from: Address, to: Address, amount: f64) -> Self {
        Transaction {
            from: Some(from),
            to,
            amount,
            timestamp: Utc::now(),
            public_key: None,
            signature: None,
        }
    }

    /// Creates a mining reward transaction
    pub fn new_reward(to: Address, amount: f64) -> Self {
        Self::system_minted(to, amount, Utc::now())
    }

    /// Creates a system-minted transaction with a fixed timestamp
    pub fn system_minted(to: Address, amount: f64, timestamp: DateTime<Utc>) -> Self {
        Transaction {
            from: None,
            to,
            amount,
            timestamp,
            public_key: None,
            signature: None,
        }
    }

    /// Checks if the transaction was minted by the system (no sender)
    pub fn is_system_minted(&self) -> bool {
        self.from.is_none()
    }

    /// Canonical bytes covered by the signature
    pub fn signing_payload(&self) -> Result<Vec<u8>, TransactionError> {
        let payload = SigningPayload {
            from: &self.from,
            to: &self.to,
            amount: self.amount,
            timestamp: &self.timestamp,
            public_key: &self.public_key,
        };

        serde_json::to_vec(&payload)
            .map_err(|e| TransactionError::SerializationError(e.to_string()))
    }

    /// Signs the transaction with a wallet
    ///
    /// Attaches the wallet's public key, then signs the payload including it.
    pub fn sign(&mut self, wallet: &Wallet) -> Result<(), TransactionError> {
        if self.signature.is_some() {
            return Err(TransactionError::AlreadySigned);
        }

        let sender = self.from.clone().ok_or(TransactionError::SystemMinted)?;
        if wallet.address() != &sender {
            return Err(TransactionError::SignerMismatch {
                signer: wallet.address().clone(),
                sender,
            });
        }

        self.public_key = Some(wallet.public_key());
        let payload = self.signing_payload()?;
        self.signature = Some(wallet.sign(&payload));

        Ok(())
    }

    /// Verifies the transaction's signature
    ///
    /// The attached public key must derive to the sender address and the
    /// signature must verify under it.
    pub fn verify_signature(&self) -> Result<(), TransactionError> {
        let sender = self.from.as_ref().ok_or(TransactionError::SystemMinted)?;
        let signature = self.signature.as_ref().ok_or(TransactionError::NotSigned)?;
        let public_key = self.public_key.as_ref().ok_or(TransactionError::MissingPublicKey)?;

        let signer = public_key.to_address()?;
        if &signer != sender {
            return Err(TransactionError::SignerMismatch {
                signer,
                sender: sender.clone(),
            });
        }

        let payload = self.signing_payload()?;
        if verify_signature(&payload, signature, public_key)? {
            Ok(())
        } else {
            Err(TransactionError::InvalidSignature)
        }
    }
}
