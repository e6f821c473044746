use std::fmt;
use std::path::Path;

use std::collections::BTreeMap;

use log::{debug, warn};
use parking_lot::Mutex;
use sled::{Batch, Db, Tree};
use thiserror::Error;

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Load/save of chain and pending-pool snapshots.
///
/// `Ok(None)` from a load means nothing was saved yet. Snapshots must
/// round-trip every field exactly.
pub trait PersistenceAdapter: Send + Sync + fmt::Debug {
    fn load_chain(&self) -> Result<Option<Vec<Block>>, StorageError>;

    fn save_chain(&self, chain: &[Block]) -> Result<(), StorageError>;

    fn load_pending_pool(&self) -> Result<Option<Vec<Transaction>>, StorageError>;

    fn save_pending_pool(&self, pending: &[Transaction]) -> Result<(), StorageError>;
}

/// Seed phrases of the wallets a node holds, keyed by address
pub trait WalletStore: Send + Sync + fmt::Debug {
    /// All saved seed phrases, in address order
    fn load_seed_phrases(&self) -> Result<Vec<String>, StorageError>;

    fn save_seed_phrase(&self, address: &Address, seed_phrase: &str) -> Result<(), StorageError>;
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::DeserializationError(e.to_string()))
}

const PENDING_KEY: &str = "pool";
const LATEST_BLOCK_HASH_KEY: &str = "latest_block_hash";
const BLOCK_HEIGHT_KEY: &str = "block_height";

/// Sled-backed storage for blockchain data
pub struct SledStorage {
    /// The database instance
    db: Db,

    /// Blocks keyed by big-endian index, so iteration follows chain order
    blocks: Tree,

    /// Single snapshot of the pending pool
    pending: Tree,

    /// Tree for metadata
    metadata: Tree,

    /// Seed phrases keyed by address
    wallets: Tree,
}

impl fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledStorage").finish()
    }
}

impl SledStorage {
    /// Opens (or creates) the storage
    ///
    /// # Arguments
    ///
    /// * `path` - The path to the database directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;

        let blocks = db.open_tree("blocks")?;
        let pending = db.open_tree("pending")?;
        let metadata = db.open_tree("metadata")?;
        let wallets = db.open_tree("wallets")?;

        Ok(Self {
            db,
            blocks,
            pending,
            metadata,
            wallets,
        })
    }

    /// Gets the current block height
    ///
    /// # Returns
    ///
    /// `None` if no chain has been saved
    pub fn block_height(&self) -> Result<Option<u64>, StorageError> {
        match self.metadata.get(BLOCK_HEIGHT_KEY)? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    /// Gets the latest block hash
    pub fn latest_block_hash(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .metadata
            .get(LATEST_BLOCK_HASH_KEY)?
            .map(|value| String::from_utf8_lossy(&value).to_string()))
    }

    /// Flushes all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl PersistenceAdapter for SledStorage {
    fn load_chain(&self) -> Result<Option<Vec<Block>>, StorageError> {
        let mut blocks = Vec::new();

        for result in self.blocks.iter() {
            let (_, value) = result?;
            blocks.push(decode::<Block>(&value)?);
        }

        if blocks.is_empty() {
            return Ok(None);
        }

        debug!("Loaded {} blocks from storage", blocks.len());
        Ok(Some(blocks))
    }

    fn save_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        let mut batch = Batch::default();

        for block in chain {
            batch.insert(block.index.to_be_bytes().to_vec(), encode(block)?);
        }

        // A shorter snapshot replaces a longer one entirely
        let stale_from = (chain.len() as u64).to_be_bytes();
        for result in self.blocks.range(stale_from..) {
            let (key, _) = result?;
            batch.remove(key);
        }

        self.blocks.apply_batch(batch)?;

        if let Some(tip) = chain.last() {
            self.metadata.insert(LATEST_BLOCK_HASH_KEY, tip.hash.as_bytes())?;
            self.metadata.insert(BLOCK_HEIGHT_KEY, encode(&tip.index)?)?;
        }

        self.flush()
    }

    fn load_pending_pool(&self) -> Result<Option<Vec<Transaction>>, StorageError> {
        match self.pending.get(PENDING_KEY)? {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    fn save_pending_pool(&self, pending: &[Transaction]) -> Result<(), StorageError> {
        self.pending.insert(PENDING_KEY, encode(pending)?)?;
        self.flush()
    }
}

impl WalletStore for SledStorage {
    fn load_seed_phrases(&self) -> Result<Vec<String>, StorageError> {
        self.wallets
            .iter()
            .values()
            .map(|value| {
                let value = value?;
                String::from_utf8(value.to_vec())
                    .map_err(|e| StorageError::DeserializationError(e.to_string()))
            })
            .collect()
    }

    fn save_seed_phrase(&self, address: &Address, seed_phrase: &str) -> Result<(), StorageError> {
        self.wallets.insert(address.as_str(), seed_phrase.as_bytes())?;
        self.flush()
    }
}

/// In-process storage holding the same encoded snapshots as [`SledStorage`]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    chain: Mutex<Option<Vec<u8>>>,
    pending: Mutex<Option<Vec<u8>>>,
    wallets: Mutex<BTreeMap<Address, String>>,
}

impl MemoryStorage {
    /// Creates an empty in-memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for MemoryStorage {
    fn load_chain(&self) -> Result<Option<Vec<Block>>, StorageError> {
        match self.chain.lock().as_deref() {
            Some(bytes) => {
                let blocks: Vec<Block> = decode(bytes)?;
                Ok(if blocks.is_empty() { None } else { Some(blocks) })
            }
            None => Ok(None),
        }
    }

    fn save_chain(&self, chain: &[Block]) -> Result<(), StorageError> {
        *self.chain.lock() = Some(encode(chain)?);
        Ok(())
    }

    fn load_pending_pool(&self) -> Result<Option<Vec<Transaction>>, StorageError> {
        match self.pending.lock().as_deref() {
            Some(bytes) => Ok(Some(decode(bytes)?)),
            None => Ok(None),
        }
    }

    fn save_pending_pool(&self, pending: &[Transaction]) -> Result<(), StorageError> {
        *self.pending.lock() = Some(encode(pending)?);
        Ok(())
    }
}

impl WalletStore for MemoryStorage {
    fn load_seed_phrases(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.wallets.lock().values().cloned().collect())
    }

    fn save_seed_phrase(&self, address: &Address, seed_phrase: &str) -> Result<(), StorageError> {
        self.wallets.lock().insert(address.clone(), seed_phrase.to_string());
        Ok(())
    }
}

/// Logs and swallows a failed snapshot write
pub(crate) fn warn_on_failure(what: &str, result: Result<(), StorageError>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to save {}: {}. Continuing in memory", what, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{derive_address, derive_key, Address};
    use crate::blockchain::miner::Miner;

    fn address(seed: &str) -> Address {
        derive_address(&derive_key(seed).unwrap())
    }

    fn sample_chain() -> Vec<Block> {
        let genesis = Block::genesis(address("founder"), 1000.0);
        let pending = vec![Transaction::new(address("founder"), address("bravo"), 0.1 + 0.2)];
        let block = Miner::new(1, 100.0).mine(&pending, &genesis, &address("miner")).block;
        vec![genesis, block]
    }

    fn round_trip(storage: &dyn PersistenceAdapter) {
        assert!(storage.load_chain().unwrap().is_none());
        assert!(storage.load_pending_pool().unwrap().is_none());

        let chain = sample_chain();
        storage.save_chain(&chain).unwrap();
        assert_eq!(storage.load_chain().unwrap(), Some(chain.clone()));

        let pending = vec![Transaction::new(address("bravo"), address("charlie"), 1e-9)];
        storage.save_pending_pool(&pending).unwrap();
        assert_eq!(storage.load_pending_pool().unwrap(), Some(pending));

        // An empty pool is saved state, not absence
        storage.save_pending_pool(&[]).unwrap();
        assert_eq!(storage.load_pending_pool().unwrap(), Some(Vec::new()));

        // Hashes still verify after the round trip
        let loaded = storage.load_chain().unwrap().unwrap();
        assert_eq!(loaded[1].hash, loaded[1].recompute_hash());
        assert_eq!(loaded[1].transactions[0].amount, 0.1 + 0.2);
    }

    #[test]
    fn test_memory_storage_round_trip() {
        round_trip(&MemoryStorage::new());
    }

    #[test]
    fn test_sled_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();

        round_trip(&storage);

        assert_eq!(storage.block_height().unwrap(), Some(1));
        let chain = storage.load_chain().unwrap().unwrap();
        assert_eq!(storage.latest_block_hash().unwrap(), Some(chain[1].hash.clone()));
    }

    #[test]
    fn test_sled_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let chain = sample_chain();

        {
            let storage = SledStorage::open(dir.path()).unwrap();
            storage.save_chain(&chain).unwrap();
        }

        let reopened = SledStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.load_chain().unwrap(), Some(chain));
    }

    #[test]
    fn test_sled_storage_drops_stale_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        let chain = sample_chain();

        storage.save_chain(&chain).unwrap();
        storage.save_chain(&chain[..1]).unwrap();

        assert_eq!(storage.load_chain().unwrap(), Some(chain[..1].to_vec()));
    }

    #[test]
    fn test_sled_wallets_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = SledStorage::open(dir.path()).unwrap();
            storage.save_seed_phrase(&address("bravo"), "bravo").unwrap();
            storage.save_seed_phrase(&address("alpha"), "alpha").unwrap();
            // Saving again under the same address replaces the entry
            storage.save_seed_phrase(&address("alpha"), "alpha").unwrap();
        }

        let reopened = SledStorage::open(dir.path()).unwrap();
        let mut phrases = reopened.load_seed_phrases().unwrap();
        phrases.sort();
        assert_eq!(phrases, vec!["alpha".to_string(), "bravo".to_string()]);
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let storage = MemoryStorage::new();
        *storage.chain.lock() = Some(vec![0xff; 3]);

        assert!(matches!(
            storage.load_chain(),
            Err(StorageError::DeserializationError(_))
        ));
    }
}
