use thiserror::Error;

use super::block::Block;

/// Which integrity check a block failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViolationKind {
    /// `index` is not the block's position in the chain
    #[error("index does not match its position")]
    IndexMismatch,

    /// `previous_hash` differs from the predecessor's hash
    #[error("previous hash does not match the preceding block")]
    BrokenLink,

    /// The stored hash differs from the recomputed one
    #[error("stored hash does not match the recomputed hash")]
    HashMismatch,

    /// The first block is not the configured genesis block
    #[error("genesis block does not match the configured genesis")]
    GenesisMismatch,
}

/// The first integrity failure found in a chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("block {position}: {kind}")]
pub struct IntegrityViolation {
    /// Position of the offending block
    pub position: usize,

    pub kind: ViolationKind,
}

/// Walks the chain checking linkage and recomputed hashes.
///
/// Stops at the first failure. The genesis block is never checked against a
/// predecessor.
pub fn validate_chain(chain: &[Block]) -> Result<(), IntegrityViolation> {
    for (position, pair) in chain.windows(2).enumerate().map(|(i, pair)| (i + 1, pair)) {
        let (previous_block, current_block) = (&pair[0], &pair[1]);

        let violation = |kind| IntegrityViolation { position, kind };

        if current_block.index != position as u64 {
            return Err(violation(ViolationKind::IndexMismatch));
        }

        if current_block.previous_hash != previous_block.hash {
            return Err(violation(ViolationKind::BrokenLink));
        }

        if current_block.hash != current_block.recompute_hash() {
            return Err(violation(ViolationKind::HashMismatch));
        }
    }

    Ok(())
}

/// Like [`validate_chain`], but the chain must also start with `genesis`
pub fn validate_chain_from(chain: &[Block], genesis: &Block) -> Result<(), IntegrityViolation> {
    if chain.first().map_or(false, |first| first != genesis) {
        return Err(IntegrityViolation {
            position: 0,
            kind: ViolationKind::GenesisMismatch,
        });
    }

    validate_chain(chain)
}

/// Checks whether a chain passes [`validate_chain`]
pub fn is_valid(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::crypto::{derive_address, derive_key, Address};
    use crate::blockchain::miner::Miner;
    use crate::blockchain::transaction::Transaction;

    fn address(seed: &str) -> Address {
        derive_address(&derive_key(seed).unwrap())
    }

    fn mined_chain(length: usize) -> Vec<Block> {
        let miner = Miner::new(1, 100.0);
        let mut chain = vec![Block::genesis(address("founder"), 1000.0)];

        for i in 1..length {
            let pending = vec![Transaction::new(address("founder"), address("bravo"), i as f64)];
            let previous = chain.last().unwrap().clone();
            chain.push(miner.mine(&pending, &previous, &address("miner")).block);
        }

        chain
    }

    #[test]
    fn test_genesis_only_chain_is_valid() {
        assert!(is_valid(&mined_chain(1)));
        assert!(is_valid(&[]));
    }

    #[test]
    fn test_mined_chain_is_valid() {
        assert_eq!(validate_chain(&mined_chain(4)), Ok(()));
    }

    #[test]
    fn test_tampered_amount_detected() {
        let mut chain = mined_chain(3);
        chain[1].transactions[0].amount = 1_000_000.0;

        assert_eq!(
            validate_chain(&chain),
            Err(IntegrityViolation {
                position: 1,
                kind: ViolationKind::HashMismatch
            })
        );
    }

    #[test]
    fn test_rehashed_tampering_breaks_link() {
        let mut chain = mined_chain(3);
        chain[1].transactions[0].amount = 1_000_000.0;
        chain[1].hash = chain[1].recompute_hash();

        assert_eq!(
            validate_chain(&chain),
            Err(IntegrityViolation {
                position: 2,
                kind: ViolationKind::BrokenLink
            })
        );
    }

    #[test]
    fn test_index_mismatch_detected() {
        let mut chain = mined_chain(2);
        chain[1].index = 5;

        let violation = validate_chain(&chain).unwrap_err();
        assert_eq!(violation.kind, ViolationKind::IndexMismatch);
        assert_eq!(violation.to_string(), "block 1: index does not match its position");
    }

    #[test]
    fn test_rewritten_genesis_detected() {
        let genesis = Block::genesis(address("founder"), 1000.0);
        let rewritten = vec![Block::genesis(address("founder"), 5000.0)];

        assert_eq!(validate_chain_from(&mined_chain(3), &genesis), Ok(()));
        assert!(is_valid(&rewritten));

        let violation = validate_chain_from(&rewritten, &genesis).unwrap_err();
        assert_eq!(violation.kind, ViolationKind::GenesisMismatch);
        assert_eq!(
            violation.to_string(),
            "block 0: genesis block does not match the configured genesis"
        );
    }

    #[test]
    fn test_tampered_genesis_detected_by_successor() {
        let mut chain = mined_chain(2);
        chain[0].transactions[0].amount = 5000.0;
        chain[0].hash = chain[0].recompute_hash();

        assert!(!is_valid(&chain));
    }
}
