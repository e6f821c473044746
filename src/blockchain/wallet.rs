use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::seq::SliceRandom;

use std::sync::Arc;

use super::chain::{Blockchain, LedgerError};
use super::crypto::{
    derive_address, derive_key, Address, CryptoError, DigitalSignature, KeyMaterial, PublicKey,
};
use super::signature::{Ed25519Scheme, SignatureScheme};
use super::storage::{warn_on_failure, WalletStore};
use super::transaction::Transaction;

/// Words a generated seed phrase is drawn from
const WORD_LIST: [&str; 26] = [
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango",
    "uniform", "victor", "whiskey", "xray", "yankee", "zulu",
];

/// Number of words in a generated seed phrase
const SEED_WORDS: usize = 12;

/// Generates a random seed phrase
pub fn generate_seed_phrase() -> String {
    let mut rng = OsRng;

    (0..SEED_WORDS)
        .filter_map(|_| WORD_LIST.choose(&mut rng).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A wallet: seed phrase, the key material derived from it, and its address
#[derive(Debug, Clone)]
pub struct Wallet {
    seed_phrase: String,
    key: KeyMaterial,
    address: Address,
}

impl Wallet {
    /// Creates a new wallet from a freshly generated seed phrase
    pub fn generate() -> Result<Self, CryptoError> {
        Self::from_seed_phrase(&generate_seed_phrase())
    }

    /// Restores a wallet from its seed phrase
    ///
    /// # Arguments
    ///
    /// * `seed_phrase` - The seed phrase the wallet was created with
    ///
    /// # Returns
    ///
    /// The same wallet (key and address) every time the same phrase is given
    pub fn from_seed_phrase(seed_phrase: &str) -> Result<Self, CryptoError> {
        let key = derive_key(seed_phrase)?;
        let address = derive_address(&key);

        Ok(Wallet {
            seed_phrase: seed_phrase.to_string(),
            key,
            address,
        })
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Gets the wallet's seed phrase
    pub fn seed_phrase(&self) -> &str {
        &self.seed_phrase
    }

    /// Gets the wallet's public key
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Signs a message with the wallet's key
    pub fn sign(&self, message: &[u8]) -> DigitalSignature {
        Ed25519Scheme.sign(message, &self.key)
    }
}

/// Holds the wallets whose key material is available locally.
///
/// Passed explicitly to whoever needs to sign; cloning shares the store.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    wallets: Arc<DashMap<Address, Wallet>>,

    /// Where registered wallets are saved, if anywhere
    store: Option<Arc<dyn WalletStore>>,

    /// Serializes the balance check and submission of [`KeyStore::submit_transfer`]
    transfers: Arc<Mutex<()>>,
}

impl KeyStore {
    /// Creates an empty in-memory key store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key store backed by `store`, restoring every saved wallet
    ///
    /// Saved seed phrases that no longer derive a wallet are skipped with a
    /// warning. A store that cannot be read leaves the key store empty.
    pub fn with_store(store: Arc<dyn WalletStore>) -> Self {
        let mut key_store = Self::new();

        match store.load_seed_phrases() {
            Ok(seed_phrases) => {
                for seed_phrase in seed_phrases {
                    match Wallet::from_seed_phrase(&seed_phrase) {
                        Ok(wallet) => {
                            key_store.wallets.insert(wallet.address().clone(), wallet);
                        }
                        Err(err) => warn!("Skipping saved wallet: {}", err),
                    }
                }
                info!("Loaded {} wallets from storage", key_store.wallets.len());
            }
            Err(err) => warn!("Failed to load wallets from storage: {}", err),
        }

        key_store.store = Some(store);
        key_store
    }

    /// Adds a wallet, replacing any wallet with the same address
    pub fn insert(&self, wallet: Wallet) -> Address {
        let address = wallet.address().clone();

        if let Some(store) = &self.store {
            warn_on_failure("wallet", store.save_seed_phrase(&address, wallet.seed_phrase()));
        }

        debug!("Registered wallet {}", address);
        self.wallets.insert(address.clone(), wallet);
        address
    }

    /// Creates and registers a new wallet
    pub fn create_wallet(&self) -> Result<Wallet, CryptoError> {
        let wallet = Wallet::generate()?;
        self.insert(wallet.clone());
        info!("Created wallet {}", wallet.address());
        Ok(wallet)
    }

    /// Restores a wallet from its seed phrase and registers it
    pub fn restore_wallet(&self, seed_phrase: &str) -> Result<Wallet, CryptoError> {
        let wallet = Wallet::from_seed_phrase(seed_phrase)?;
        self.insert(wallet.clone());
        info!("Restored wallet {}", wallet.address());
        Ok(wallet)
    }

    /// Gets a wallet by address
    pub fn get(&self, address: &Address) -> Option<Wallet> {
        self.wallets.get(address).map(|entry| entry.value().clone())
    }

    /// Checks if key material for an address is held
    pub fn contains(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    /// Addresses of all held wallets, sorted
    pub fn addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> =
            self.wallets.iter().map(|entry| entry.key().clone()).collect();
        addresses.sort();
        addresses
    }

    /// Signs a transaction with the sender's wallet
    ///
    /// # Returns
    ///
    /// `UnknownSigner` if no key material is held for the sender
    pub fn sign_transaction(&self, transaction: &mut Transaction) -> Result<(), LedgerError> {
        let sender = transaction.from.clone().ok_or_else(|| {
            LedgerError::InvalidAddress("System-minted transactions cannot be signed".to_string())
        })?;

        let wallet = self
            .get(&sender)
            .ok_or_else(|| LedgerError::UnknownSigner(sender.clone()))?;

        transaction
            .sign(&wallet)
            .map_err(|e| LedgerError::SignatureMismatch(e.to_string()))
    }

    /// Builds and signs a transfer after checking the sender can afford it.
    ///
    /// Spendable balance is the confirmed balance minus the sender's
    /// outgoing amounts still in the pending pool. The ledger itself does not
    /// apply this check; it is the policy of callers that use this method.
    ///
    /// The check is not atomic with a later submission. Use
    /// [`KeyStore::submit_transfer`] to check and submit in one step.
    pub fn prepare_transfer(
        &self,
        ledger: &Blockchain,
        from: &Address,
        to: &Address,
        amount: f64,
    ) -> Result<Transaction, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(format!(
                "Amount must be positive: {}",
                amount
            )));
        }

        if !self.contains(from) {
            return Err(LedgerError::UnknownSigner(from.clone()));
        }

        let available = ledger.spendable_balance(from);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let mut transaction = Transaction::new(from.clone(), to.clone(), amount);
        self.sign_transaction(&mut transaction)?;

        Ok(transaction)
    }

    /// Prepares a transfer and submits it to the ledger
    ///
    /// Transfers made through the same key store are checked and submitted
    /// one at a time, so two of them cannot both spend the same balance.
    /// Transactions submitted to the ledger directly bypass this check.
    ///
    /// # Returns
    ///
    /// The submitted transaction and the index of the block that will include it
    pub fn submit_transfer(
        &self,
        ledger: &Blockchain,
        from: &Address,
        to: &Address,
        amount: f64,
    ) -> Result<(Transaction, u64), LedgerError> {
        let _transfer = self.transfers.lock();

        let transaction = self.prepare_transfer(ledger, from, to, amount)?;
        let block_index = ledger.submit_transaction(transaction.clone())?;

        Ok((transaction, block_index))
    }
}
