use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::crypto::Address;
use super::transaction::Transaction;

/// Genesis timestamp (2024-01-01T00:00:00Z)
pub const GENESIS_TIMESTAMP_SECS: i64 = 1_704_067_200;

/// Previous hash recorded in the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Index of the block in the chain
    pub index: u64,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2024-01-01T12:00:00Z")]
    pub timestamp: DateTime<Utc>,

    /// List of transactions included in this block
    pub transactions: Vec<Transaction>,

    /// Hash of the previous block
    pub previous_hash: String,

    /// Proof of work (nonce)
    pub nonce: u64,

    /// Hash of the current block, empty while unsealed
    pub hash: String,
}

/// The hashed fields of a block, in canonical order.
///
/// The compact JSON encoding of this struct is the block's hash preimage.
/// `nonce` must stay the last field: the miner hashes everything before it once.
#[derive(Serialize)]
struct CanonicalHeader<'a> {
    index: u64,
    previous_hash: &'a str,
    timestamp: &'a DateTime<Utc>,
    transactions: &'a [Transaction],
    nonce: u64,
}

impl Block {
    /// Creates an unsealed candidate block with nonce 0
    ///
    /// # Arguments
    ///
    /// * `index` - The index of the block in the chain
    /// * `timestamp` - The block timestamp
    /// * `transactions` - The list of transactions to include in the block
    /// * `previous_hash` - The hash of the previous block
    pub fn candidate(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
    ) -> Self {
        Block {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Creates the genesis block, crediting the founder with the initial supply
    ///
    /// The genesis block is not mined, so its hash is exempt from the
    /// difficulty predicate.
    pub fn genesis(founder: Address, initial_supply: f64) -> Self {
        let timestamp = genesis_timestamp();
        let founder_transaction = Transaction::system_minted(founder, initial_supply, timestamp);

        let mut block = Block::candidate(
            0,
            timestamp,
            vec![founder_transaction],
            GENESIS_PREVIOUS_HASH.to_string(),
        );
        block.hash = block.recompute_hash();
        block
    }

    fn canonical_bytes(&self, nonce: u64) -> Vec<u8> {
        let header = CanonicalHeader {
            index: self.index,
            previous_hash: &self.previous_hash,
            timestamp: &self.timestamp,
            transactions: &self.transactions,
            nonce,
        };

        // Only strings, integers and floats: serializing to a Vec cannot fail
        serde_json::to_vec(&header).expect("block header serializes to JSON")
    }

    /// Hash of this block's contents with a trial nonce, used while mining
    pub fn compute_candidate_hash(&self, nonce: u64) -> String {
        hex::encode(Sha256::digest(self.canonical_bytes(nonce)))
    }

    /// Recomputes the hash from the block's own fields, used by validation
    ///
    /// # Returns
    ///
    /// The SHA-256 hash of the block as a hexadecimal string
    pub fn recompute_hash(&self) -> String {
        self.compute_candidate_hash(self.nonce)
    }

    /// Whether the block has been sealed with a hash
    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty()
    }
}

/// The fixed genesis timestamp
pub fn genesis_timestamp() -> DateTime<Utc> {
    Utc.timestamp_opt(GENESIS_TIMESTAMP_SECS, 0)
        .single()
        .unwrap_or_default()
}

/// Checks that a hash has at least `difficulty` leading zero hex characters
pub fn meets_difficulty(hash: &str, difficulty: usize) -> bool {
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Hashes a candidate block for successive nonces.
///
/// The canonical encoding ends in `"nonce":<n>}`, so the SHA-256 state after
/// absorbing everything before the nonce is computed once and cloned per try.
/// Produces exactly [`Block::compute_candidate_hash`].
pub struct CandidateHasher {
    midstate: Sha256,
}

impl CandidateHasher {
    /// Prepares the midstate for a candidate block
    pub fn new(candidate: &Block) -> Self {
        let encoded = candidate.canonical_bytes(0);
        let prefix = encoded.strip_suffix(b"0}").unwrap_or(&encoded);

        let mut midstate = Sha256::new();
        midstate.update(prefix);

        CandidateHasher { midstate }
    }

    /// Hash of the candidate with the given nonce
    pub fn hash(&self, nonce: u64) -> String {
        let mut hasher = self.midstate.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{derive_address, derive_key};

    fn address(seed: &str) -> Address {
        derive_address(&derive_key(seed).unwrap())
    }

    fn sample_block() -> Block {
        let transactions = vec![
            Transaction::new(address("alpha"), address("bravo"), 10.0),
            Transaction::new_reward(address("charlie"), 100.0),
        ];

        Block::candidate(1, Utc::now(), transactions, "previous_hash".to_string())
    }

    #[test]
    fn test_candidate_block() {
        let block = sample_block();

        assert_eq!(block.index, 1);
        assert_eq!(block.nonce, 0);
        assert_eq!(block.previous_hash, "previous_hash");
        assert!(!block.is_sealed());
    }

    #[test]
    fn test_recompute_hash() {
        let block = sample_block();

        let hash = block.recompute_hash();
        assert_eq!(hash.len(), 64); // SHA-256 hash is 64 characters in hex
        assert_eq!(hash, block.recompute_hash());
        assert_ne!(hash, block.compute_candidate_hash(1));
    }

    #[test]
    fn test_hash_covers_transactions() {
        let block = sample_block();
        let mut tampered = block.clone();
        tampered.transactions[0].amount = 11.0;

        assert_ne!(block.recompute_hash(), tampered.recompute_hash());
    }

    #[test]
    fn test_canonical_encoding_layout() {
        let block = Block::genesis(address("founder"), 1000.0);
        let encoded = String::from_utf8(block.canonical_bytes(7)).unwrap();

        assert!(encoded.starts_with(concat!(
            r#"{"index":0,"previous_hash":"0","timestamp":"2024-01-01T00:00:00Z","#,
            r#""transactions":[{"from":null,"#
        )));
        assert!(encoded.contains("\"amount\":1000.0"));
        assert!(encoded.ends_with(",\"nonce\":7}"));
    }

    #[test]
    fn test_candidate_hasher_matches_recompute() {
        let block = sample_block();
        let hasher = CandidateHasher::new(&block);

        for nonce in [0, 1, 9, 10, 255, 1_000_000, u64::MAX] {
            assert_eq!(hasher.hash(nonce), block.compute_candidate_hash(nonce));
        }
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let first = Block::genesis(address("founder"), 1000.0);
        let second = Block::genesis(address("founder"), 1000.0);

        assert_eq!(first, second);
        assert_eq!(first.index, 0);
        assert_eq!(first.previous_hash, GENESIS_PREVIOUS_HASH);
        assert_eq!(first.hash, first.recompute_hash());
        assert_eq!(first.transactions.len(), 1);
        assert!(first.transactions[0].is_system_minted());
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(meets_difficulty("000b", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("00", 3));
    }
}
