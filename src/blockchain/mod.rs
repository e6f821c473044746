// Blockchain module
//
// This module contains the core ledger implementation including:
// - Block structure and proof-of-work hashing
// - The ledger (chain plus pending pool)
// - Transactions, signatures and seed-derived wallets
// - Chain validation
// - Snapshot persistence

pub mod block;
pub mod chain;
pub mod crypto;
pub mod miner;
pub mod signature;
pub mod storage;
pub mod transaction;
pub mod validator;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{Blockchain, LedgerError};
pub use crypto::{Address, DigitalSignature, PublicKey};
pub use storage::{MemoryStorage, PersistenceAdapter, SledStorage, StorageError};
pub use transaction::Transaction;
pub use validator::{validate_chain, IntegrityViolation};
pub use wallet::{KeyStore, Wallet};
