use crate::core::block::{compute_hash, Block};
use crate::core::transaction::Transaction;
use crate::error::Result;
use data_encoding::HEXLOWER_PERMISSIVE;
use log::info;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};

/// Nonces tried between cancellation checks.
const NONCE_CHUNK: u64 = 4096;

const MAX_NONCE: u64 = u64::MAX;

/// Proof-of-work search over a fixed candidate header. The nonce scans
/// upward from 0; the first hash with a leading run of zero bits at least
/// as long as the difficulty wins. The search checks a shared cancel flag
/// between nonce chunks so a host can abandon it cleanly.
pub struct ProofOfWork {
    index: u64,
    previous_hash: String,
    timestamp: i64,
    transactions: Vec<Transaction>,
    difficulty: u32,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new(
        index: u64,
        previous_hash: String,
        timestamp: i64,
        transactions: Vec<Transaction>,
        difficulty: u32,
    ) -> ProofOfWork {
        ProofOfWork {
            index,
            previous_hash,
            timestamp,
            transactions,
            difficulty,
            target: difficulty_target(difficulty),
        }
    }

    /// Search until a satisfying nonce is found or the flag is raised.
    /// Returns `None` when cancelled; nothing is appended either way.
    pub fn run(&self, cancel: &AtomicBool) -> Result<Option<Block>> {
        info!(
            "Mining block {} at difficulty {}",
            self.index, self.difficulty
        );
        let mut nonce: u64 = 0;
        while nonce < MAX_NONCE {
            if cancel.load(Ordering::Relaxed) {
                info!("Mining of block {} cancelled at nonce {nonce}", self.index);
                return Ok(None);
            }
            let chunk_end = nonce.saturating_add(NONCE_CHUNK).min(MAX_NONCE);
            while nonce < chunk_end {
                let hash = compute_hash(
                    self.index,
                    &self.previous_hash,
                    self.timestamp,
                    &self.transactions,
                    self.difficulty,
                    nonce,
                )?;
                if hash_value(&hash) < self.target {
                    info!("Found block {} with nonce {nonce}: {hash}", self.index);
                    let block = Block::new(
                        self.index,
                        self.previous_hash.clone(),
                        self.timestamp,
                        self.transactions.clone(),
                        self.difficulty,
                        nonce,
                    )?;
                    return Ok(Some(block));
                }
                nonce += 1;
            }
        }
        Ok(None)
    }
}

/// Target below which a hash satisfies `difficulty` leading zero bits.
fn difficulty_target(difficulty: u32) -> BigInt {
    let mut target = BigInt::from(1);
    target.shl_assign(256usize.saturating_sub(difficulty as usize));
    target
}

fn hash_value(hash_hex: &str) -> BigInt {
    let bytes = HEXLOWER_PERMISSIVE
        .decode(hash_hex.as_bytes())
        .unwrap_or_default();
    BigInt::from_bytes_be(Sign::Plus, &bytes)
}

/// Whether a hex hash, read as a 256-bit binary string, starts with at
/// least `difficulty` zeros.
pub fn hash_matches_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    hash_value(hash_hex) < difficulty_target(difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::GENESIS_ADDRESS;
    use crate::core::transaction::Transaction;

    fn mine(difficulty: u32) -> Block {
        let coinbase = Transaction::new_coinbase(GENESIS_ADDRESS, 1);
        let pow = ProofOfWork::new(1, "0".repeat(64), 1_600_000_000, vec![coinbase], difficulty);
        pow.run(&AtomicBool::new(false)).unwrap().unwrap()
    }

    #[test]
    fn test_mined_block_satisfies_declared_difficulty() {
        for difficulty in [0, 1, 4, 8] {
            let block = mine(difficulty);
            assert!(hash_matches_difficulty(block.get_hash(), difficulty));
            assert_eq!(block.get_difficulty(), difficulty);
            assert_eq!(block.recompute_hash().unwrap(), block.get_hash());
        }
    }

    #[test]
    fn test_difficulty_zero_accepts_nonce_zero() {
        let block = mine(0);
        assert_eq!(block.get_nonce(), 0);
    }

    #[test]
    fn test_cancelled_search_returns_nothing() {
        let coinbase = Transaction::new_coinbase(GENESIS_ADDRESS, 1);
        // High enough that the search cannot finish inside one chunk.
        let pow = ProofOfWork::new(1, "0".repeat(64), 1_600_000_000, vec![coinbase], 64);
        let cancel = AtomicBool::new(true);
        assert!(pow.run(&cancel).unwrap().is_none());
    }

    #[test]
    fn test_hash_matches_difficulty_reads_leading_bits() {
        let all_zero = "0".repeat(64);
        assert!(hash_matches_difficulty(&all_zero, 255));

        // 0x0f... has exactly four leading zero bits.
        let four_bits = format!("0f{}", "f".repeat(62));
        assert!(hash_matches_difficulty(&four_bits, 4));
        assert!(!hash_matches_difficulty(&four_bits, 5));

        let none = "f".repeat(64);
        assert!(hash_matches_difficulty(&none, 0));
        assert!(!hash_matches_difficulty(&none, 1));
    }
}
