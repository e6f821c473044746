use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::block::Block;
use super::crypto::{is_valid_address, Address};
use super::miner::Miner;
use super::storage::{warn_on_failure, PersistenceAdapter, StorageError};
use super::transaction::Transaction;
use super::validator::{validate_chain_from, IntegrityViolation};
use crate::config::LedgerConfig;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No key material held for {0}")]
    UnknownSigner(Address),

    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    #[error("Transaction is already pending or committed")]
    DuplicateTransaction,

    #[error("No pending transactions to mine")]
    NoPendingTransactions,

    #[error("Chain integrity violation: {0}")]
    ChainIntegrityViolation(#[from] IntegrityViolation),

    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StorageError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: f64, available: f64 },
}

/// Represents the blockchain: committed blocks plus the pending pool
#[derive(Debug, Clone)]
pub struct Blockchain {
    /// The chain of blocks, never empty
    chain: Arc<RwLock<Vec<Block>>>,

    /// Transactions waiting to be included in the next block, in arrival order
    pending_transactions: Arc<Mutex<Vec<Transaction>>>,

    /// Held for the whole of a mining operation
    mining: Arc<Mutex<()>>,

    /// Set once validation fails; blocks mining and submissions
    integrity_violation: Arc<Mutex<Option<IntegrityViolation>>>,

    /// Set while the stored chain is behind the in-memory one
    chain_unsaved: Arc<AtomicBool>,

    miner: Miner,

    /// The block every chain of this ledger must start with
    genesis: Block,

    config: LedgerConfig,

    /// Storage for blockchain data
    storage: Option<Arc<dyn PersistenceAdapter>>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl Blockchain {
    /// Creates a new in-memory blockchain with a genesis block
    ///
    /// # Arguments
    ///
    /// * `config` - Difficulty, reward and genesis allocation
    pub fn new(config: LedgerConfig) -> Self {
        let genesis = Block::genesis(config.founder(), config.initial_supply);

        Blockchain {
            chain: Arc::new(RwLock::new(vec![genesis.clone()])),
            pending_transactions: Arc::new(Mutex::new(Vec::new())),
            mining: Arc::new(Mutex::new(())),
            integrity_violation: Arc::new(Mutex::new(None)),
            chain_unsaved: Arc::new(AtomicBool::new(false)),
            miner: Miner::new(config.difficulty, config.mining_reward),
            genesis,
            config,
            storage: None,
        }
    }

    /// Creates a blockchain backed by persistent storage
    ///
    /// Restores the saved chain and pending pool. With nothing saved, starts
    /// from genesis and saves it. If the storage cannot be read the ledger
    /// runs in memory only and the failure is logged.
    ///
    /// A restored chain is validated, including its genesis block against the
    /// configured one; if it is broken the ledger starts halted (see
    /// [`Blockchain::resume`]). Restored pending transactions that are already
    /// in the chain are dropped.
    pub fn with_storage(config: LedgerConfig, storage: Arc<dyn PersistenceAdapter>) -> Self {
        let mut blockchain = Self::new(config);

        let saved_chain = match storage.load_chain() {
            Ok(chain) => chain.filter(|chain| !chain.is_empty()),
            Err(err) => {
                warn!("Failed to load blockchain from storage: {}", err);
                warn!("Creating in-memory blockchain instead");
                return blockchain;
            }
        };

        match saved_chain {
            Some(chain) => {
                info!("Loaded blockchain with {} blocks from storage", chain.len());
                *blockchain.chain.write() = chain;

                if let Err(err) = blockchain.validate() {
                    error!("Stored blockchain failed validation: {}", err);
                }
            }
            None => {
                info!("No existing blockchain found in storage, creating genesis block");
                warn_on_failure("genesis block", storage.save_chain(&blockchain.get_chain()));
            }
        }

        match storage.load_pending_pool() {
            Ok(Some(pending)) => {
                let loaded = pending.len();
                let pending: Vec<Transaction> = pending
                    .into_iter()
                    .filter(|transaction| !blockchain.is_committed(transaction))
                    .collect();

                if pending.len() < loaded {
                    info!(
                        "Dropped {} restored pending transactions that are already committed",
                        loaded - pending.len()
                    );
                }

                info!("Loaded {} pending transactions from storage", pending.len());
                *blockchain.pending_transactions.lock() = pending;
            }
            Ok(None) => {}
            Err(err) => warn!("Failed to load pending transactions from storage: {}", err),
        }

        blockchain.storage = Some(storage);
        blockchain
    }

    /// Gets the last block in the chain
    pub fn latest_block(&self) -> Block {
        self.chain
            .read()
            .last()
            .cloned()
            .unwrap_or_else(|| self.genesis.clone())
    }

    /// Adds a new transaction to the pending transactions
    ///
    /// Checks the amount, the addresses and (unless disabled) the signature.
    /// A transaction already pending or committed is rejected, so a signed
    /// transfer cannot be replayed. Spendable balance is not checked here.
    ///
    /// # Arguments
    ///
    /// * `transaction` - The transaction to add
    ///
    /// # Returns
    ///
    /// Result with the index of the block that will include this transaction
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<u64, LedgerError> {
        self.ensure_not_halted()?;
        check_transaction(&transaction)?;

        if self.config.require_signatures {
            transaction
                .verify_signature()
                .map_err(|e| LedgerError::SignatureMismatch(e.to_string()))?;
        }

        {
            let mut pending = self.pending_transactions.lock();

            if pending.iter().any(|other| same_transaction(other, &transaction))
                || self.is_committed(&transaction)
            {
                return Err(LedgerError::DuplicateTransaction);
            }

            pending.push(transaction);
            self.persist_pending(&pending);
        }

        Ok(self.latest_block().index + 1)
    }

    /// Mines a new block with the pending transactions
    ///
    /// Only one mining operation runs at a time. Transactions submitted while
    /// the nonce search runs are not part of the block and stay pending.
    ///
    /// # Arguments
    ///
    /// * `miner_address` - The address of the miner (to receive mining reward)
    ///
    /// # Returns
    ///
    /// Result with the newly mined block
    pub fn mine(&self, miner_address: &Address) -> Result<Block, LedgerError> {
        if !is_valid_address(miner_address.as_str()) {
            return Err(LedgerError::InvalidAddress(format!(
                "miner address {}",
                miner_address
            )));
        }

        let _mining = self.mining.lock();
        self.ensure_not_halted()?;

        let pending = self.get_pending_transactions();
        if pending.is_empty() {
            return Err(LedgerError::NoPendingTransactions);
        }

        let previous = self.latest_block();
        info!(
            "Mining block {} with {} pending transactions at difficulty {}",
            previous.index + 1,
            pending.len(),
            self.miner.difficulty()
        );

        let block = self.miner.mine(&pending, &previous, miner_address).block;

        self.chain.write().push(block.clone());

        // The chain is saved before the drained pool, so the mined
        // transactions are always in at least one of the two snapshots
        self.persist_chain();

        {
            // Only mining removes from the pool, so the mined ones are still at the front
            let mut pool = self.pending_transactions.lock();
            let mined = pending.len().min(pool.len());
            pool.drain(..mined);
            self.persist_pending(&pool);
        }

        Ok(block)
    }

    /// Mines on a dedicated thread
    pub fn mine_in_background(
        &self,
        miner_address: Address,
    ) -> JoinHandle<Result<Block, LedgerError>> {
        let blockchain = self.clone();
        thread::spawn(move || blockchain.mine(&miner_address))
    }

    /// Computes the balance of an address by replaying every committed transaction
    pub fn balance_of(&self, address: &Address) -> f64 {
        let chain = self.chain.read();

        chain
            .iter()
            .flat_map(|block| block.transactions.iter())
            .fold(0.0, |mut balance, transaction| {
                if transaction.from.as_ref() == Some(address) {
                    balance -= transaction.amount;
                }
                if &transaction.to == address {
                    balance += transaction.amount;
                }
                balance
            })
    }

    /// Checks whether a committed block already holds this transaction
    fn is_committed(&self, transaction: &Transaction) -> bool {
        self.chain
            .read()
            .iter()
            .flat_map(|block| block.transactions.iter())
            .any(|committed| same_transaction(committed, transaction))
    }

    /// Sum of the address's outgoing amounts still in the pending pool
    pub fn pending_outflow(&self, address: &Address) -> f64 {
        self.pending_transactions
            .lock()
            .iter()
            .filter(|transaction| transaction.from.as_ref() == Some(address))
            .map(|transaction| transaction.amount)
            .sum()
    }

    /// Confirmed balance minus pending outgoing amounts
    pub fn spendable_balance(&self, address: &Address) -> f64 {
        self.balance_of(address) - self.pending_outflow(address)
    }

    /// Validates the blockchain, halting the ledger on failure
    pub fn validate(&self) -> Result<(), LedgerError> {
        let result = validate_chain_from(&self.chain.read(), &self.genesis);

        match result {
            Ok(()) => Ok(()),
            Err(violation) => {
                let mut halted = self.integrity_violation.lock();
                if halted.is_none() {
                    error!(
                        "Chain integrity violation ({}); refusing new transactions and blocks",
                        violation
                    );
                    *halted = Some(violation.clone());
                }
                Err(LedgerError::ChainIntegrityViolation(violation))
            }
        }
    }

    /// Validates the blockchain
    ///
    /// # Returns
    ///
    /// true if the blockchain is valid, false otherwise
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Lifts an integrity halt once the chain validates again
    pub fn resume(&self) -> Result<(), LedgerError> {
        validate_chain_from(&self.chain.read(), &self.genesis)?;

        if self.integrity_violation.lock().take().is_some() {
            info!("Chain validated again, resuming");
        }
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.integrity_violation.lock().is_some()
    }

    fn ensure_not_halted(&self) -> Result<(), LedgerError> {
        match self.integrity_violation.lock().as_ref() {
            Some(violation) => Err(LedgerError::ChainIntegrityViolation(violation.clone())),
            None => Ok(()),
        }
    }

    /// Writes the chain and pending pool to storage
    ///
    /// Unlike the automatic saves after each change, failures are returned.
    pub fn save_snapshot(&self) -> Result<(), LedgerError> {
        let storage = self.storage.as_ref().ok_or_else(|| {
            StorageError::Unavailable("No storage configured".to_string())
        })?;

        storage.save_chain(&self.chain.read())?;
        storage.save_pending_pool(&self.pending_transactions.lock())?;
        Ok(())
    }

    /// Saves the chain, returning false if the save failed
    fn persist_chain(&self) -> bool {
        let Some(storage) = &self.storage else {
            return true;
        };

        let chain = self.chain.read();
        let saved = warn_on_failure("blockchain", storage.save_chain(&chain));
        self.chain_unsaved.store(!saved, Ordering::SeqCst);

        if saved {
            info!("Saved block {} to storage", chain.len() - 1);
        }
        saved
    }

    /// Saves the pool, but never ahead of an unsaved chain
    fn persist_pending(&self, pending: &[Transaction]) {
        let Some(storage) = &self.storage else {
            return;
        };

        if self.chain_unsaved.load(Ordering::SeqCst) && !self.persist_chain() {
            warn!("Keeping the stored pending transactions until the chain is saved");
            return;
        }

        warn_on_failure("pending transactions", storage.save_pending_pool(pending));
    }

    /// Gets the entire blockchain
    pub fn get_chain(&self) -> Vec<Block> {
        self.chain.read().clone()
    }

    pub fn chain_len(&self) -> usize {
        self.chain.read().len()
    }

    /// Gets all pending transactions
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.pending_transactions.lock().clone()
    }

    pub fn difficulty(&self) -> usize {
        self.miner.difficulty()
    }

    pub fn mining_reward(&self) -> f64 {
        self.miner.reward()
    }

    pub fn has_storage(&self) -> bool {
        self.storage.is_some()
    }
}

/// Signed transactions are the same when their signatures are; unsigned
/// ones only when every field matches
fn same_transaction(a: &Transaction, b: &Transaction) -> bool {
    match (&a.signature, &b.signature) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

/// Stateless admission checks on a submitted transaction
fn check_transaction(transaction: &Transaction) -> Result<(), LedgerError> {
    if !transaction.amount.is_finite() || transaction.amount <= 0.0 {
        return Err(LedgerError::InvalidAmount(format!(
            "Amount must be positive: {}",
            transaction.amount
        )));
    }

    let sender = transaction.from.as_ref().ok_or_else(|| {
        LedgerError::InvalidAddress("System-minted transactions cannot be submitted".to_string())
    })?;

    if !is_valid_address(sender.as_str()) {
        return Err(LedgerError::InvalidAddress(format!("sender {}", sender)));
    }

    if !is_valid_address(transaction.to.as_str()) {
        return Err(LedgerError::InvalidAddress(format!(
            "recipient {}",
            transaction.to
        )));
    }

    Ok(())
}
