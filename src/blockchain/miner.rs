use chrono::Utc;
use log::{debug, info};

use std::time::{Duration, Instant};

use super::block::{meets_difficulty, Block, CandidateHasher};
use super::crypto::Address;
use super::transaction::Transaction;

/// Statistics of one nonce search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningStats {
    /// Number of hashes computed
    pub attempts: u64,

    /// Wall-clock duration of the search
    pub elapsed: Duration,
}

/// A sealed block together with the cost of finding it
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub stats: MiningStats,
}

/// Proof-of-work miner
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    /// Required number of leading zero hex characters
    difficulty: usize,

    /// Amount credited to the miner by the reward transaction
    reward: f64,
}

impl Miner {
    /// Creates a new miner
    ///
    /// # Arguments
    ///
    /// * `difficulty` - Number of leading zero hex characters a block hash needs
    /// * `reward` - The mining reward
    pub fn new(difficulty: usize, reward: f64) -> Self {
        Miner { difficulty, reward }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    pub fn reward(&self) -> f64 {
        self.reward
    }

    /// Mines a block on top of `previous`
    ///
    /// Appends a reward transaction for `miner_address` to a copy of the
    /// pending transactions, then searches nonces from 0 until the block hash
    /// meets the difficulty. The search is unbounded and cannot be interrupted.
    ///
    /// # Arguments
    ///
    /// * `pending` - The transactions to include, in pool order
    /// * `previous` - The current chain tip
    /// * `miner_address` - The address receiving the reward
    ///
    /// # Returns
    ///
    /// The sealed block and search statistics
    pub fn mine(
        &self,
        pending: &[Transaction],
        previous: &Block,
        miner_address: &Address,
    ) -> MinedBlock {
        let started = Instant::now();

        let mut transactions = pending.to_vec();
        transactions.push(Transaction::new_reward(miner_address.clone(), self.reward));

        // Block timestamps never go backwards
        let timestamp = Utc::now().max(previous.timestamp);
        let mut candidate = Block::candidate(
            previous.index + 1,
            timestamp,
            transactions,
            previous.hash.clone(),
        );

        let mut hasher = CandidateHasher::new(&candidate);
        let mut nonce: u64 = 0;
        let mut attempts: u64 = 0;

        let hash = loop {
            let hash = hasher.hash(nonce);
            attempts += 1;

            if meets_difficulty(&hash, self.difficulty) {
                break hash;
            }

            nonce = match nonce.checked_add(1) {
                Some(next) => next,
                None => {
                    // Nonce space exhausted: move the timestamp and start over
                    debug!(
                        "Nonce space exhausted for block {}, refreshing timestamp",
                        candidate.index
                    );
                    candidate.timestamp = Utc::now().max(previous.timestamp);
                    hasher = CandidateHasher::new(&candidate);
                    0
                }
            };
        };

        candidate.nonce = nonce;
        candidate.hash = hash;

        let stats = MiningStats {
            attempts,
            elapsed: started.elapsed(),
        };

        info!(
            "Block {} mined: {} (nonce {}, {} attempts in {:?})",
            candidate.index, candidate.hash, candidate.nonce, stats.attempts, stats.elapsed
        );

        MinedBlock {
            block: candidate,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{derive_address, derive_key};

    fn address(seed: &str) -> Address {
        derive_address(&derive_key(seed).unwrap())
    }

    #[test]
    fn test_mined_block_meets_difficulty() {
        let genesis = Block::genesis(address("founder"), 1000.0);
        let pending = vec![Transaction::new(address("founder"), address("bravo"), 10.0)];

        for difficulty in 1..=3 {
            let mined = Miner::new(difficulty, 100.0).mine(&pending, &genesis, &address("miner"));

            assert!(mined.block.hash.starts_with(&"0".repeat(difficulty)));
            assert_eq!(mined.block.hash, mined.block.recompute_hash());
            assert!(mined.stats.attempts >= 1);
            assert_eq!(mined.stats.attempts, mined.block.nonce + 1);
        }
    }

    #[test]
    fn test_mined_block_links_to_previous() {
        let genesis = Block::genesis(address("founder"), 1000.0);
        let mined = Miner::new(1, 100.0).mine(&[], &genesis, &address("miner")).block;

        assert_eq!(mined.index, 1);
        assert_eq!(mined.previous_hash, genesis.hash);
        assert!(mined.timestamp >= genesis.timestamp);
        assert!(mined.is_sealed());
    }

    #[test]
    fn test_reward_is_appended_last() {
        let genesis = Block::genesis(address("founder"), 1000.0);
        let pending = vec![
            Transaction::new(address("founder"), address("bravo"), 1.0),
            Transaction::new(address("founder"), address("charlie"), 2.0),
        ];

        let block = Miner::new(1, 50.0).mine(&pending, &genesis, &address("miner")).block;

        assert_eq!(block.transactions.len(), 3);
        assert_eq!(&block.transactions[..2], &pending[..]);

        let reward = &block.transactions[2];
        assert!(reward.is_system_minted());
        assert_eq!(reward.to, address("miner"));
        assert_eq!(reward.amount, 50.0);
    }
}
