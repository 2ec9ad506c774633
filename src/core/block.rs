use crate::core::transaction::Transaction;
use crate::error::Result;
use crate::utils::sha256_hex;
use serde::{Deserialize, Serialize};

/// Address receiving the genesis reward. Balances start here.
pub const GENESIS_ADDRESS: &str = "04201fc2c89b5cf914008e33cf0428ee8dfdcba10eed380fc939a85526360f60961ce3297159355f4949eec5a72a010539cbd490be0693f339769a1cbe1eb0cebf";

const GENESIS_TIMESTAMP: i64 = 1529911829;

/// One block of the chain. Immutable once appended; discarded only by a
/// full chain replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    hash: String,
    previous_hash: String,
    timestamp: i64,
    difficulty: u32,
    nonce: u64,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        index: u64,
        previous_hash: String,
        timestamp: i64,
        transactions: Vec<Transaction>,
        difficulty: u32,
        nonce: u64,
    ) -> Result<Block> {
        let hash = compute_hash(
            index,
            &previous_hash,
            timestamp,
            &transactions,
            difficulty,
            nonce,
        )?;
        Ok(Block {
            index,
            hash,
            previous_hash,
            timestamp,
            difficulty,
            nonce,
            transactions,
        })
    }

    /// The fixed starting point of every node: one coinbase-shaped
    /// transaction paying the genesis address, zero difficulty and nonce.
    /// Every chain must share this block exactly.
    pub fn genesis() -> Block {
        let coinbase = Transaction::new_coinbase(GENESIS_ADDRESS, 0);
        Block::new(0, String::new(), GENESIS_TIMESTAMP, vec![coinbase], 0, 0)
            .expect("genesis block construction is infallible")
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    /// Recompute this block's hash from its own fields.
    pub fn recompute_hash(&self) -> Result<String> {
        compute_hash(
            self.index,
            &self.previous_hash,
            self.timestamp,
            &self.transactions,
            self.difficulty,
            self.nonce,
        )
    }

    /// Shape check applied to blocks arriving from peers before anything
    /// else looks at them.
    pub fn has_valid_structure(&self) -> bool {
        let hex_hash = |s: &str| s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit());
        hex_hash(&self.hash)
            && (self.previous_hash.is_empty() || hex_hash(&self.previous_hash))
            && !self.transactions.is_empty()
    }
}

/// Block hash: SHA-256 over the concatenation of every header field and
/// the JSON rendering of the transaction list.
pub fn compute_hash(
    index: u64,
    previous_hash: &str,
    timestamp: i64,
    transactions: &[Transaction],
    difficulty: u32,
    nonce: u64,
) -> Result<String> {
    let tx_json = serde_json::to_string(transactions)?;
    let content =
        format!("{index}{previous_hash}{timestamp}{tx_json}{difficulty}{nonce}");
    Ok(sha256_hex(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_reproducible() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a, b);
        assert_eq!(a.get_index(), 0);
        assert_eq!(a.get_difficulty(), 0);
        assert_eq!(a.get_previous_hash(), "");
        assert_eq!(a.get_transactions().len(), 1);
        assert_eq!(
            a.get_transactions()[0].id,
            "5a504b62f3326fa95076fa827ac94d0439ccfe2df09dc19e933e91d1445a2154"
        );
    }

    #[test]
    fn test_hash_covers_every_header_field() {
        let genesis = Block::genesis();
        let txs = genesis.get_transactions().to_vec();

        let base = compute_hash(1, genesis.get_hash(), 1000, &txs, 2, 5).unwrap();
        assert_ne!(base, compute_hash(2, genesis.get_hash(), 1000, &txs, 2, 5).unwrap());
        assert_ne!(base, compute_hash(1, "", 1000, &txs, 2, 5).unwrap());
        assert_ne!(base, compute_hash(1, genesis.get_hash(), 1001, &txs, 2, 5).unwrap());
        assert_ne!(base, compute_hash(1, genesis.get_hash(), 1000, &txs, 3, 5).unwrap());
        assert_ne!(base, compute_hash(1, genesis.get_hash(), 1000, &txs, 2, 6).unwrap());
        assert_eq!(base, compute_hash(1, genesis.get_hash(), 1000, &txs, 2, 5).unwrap());
    }

    #[test]
    fn test_structure_check() {
        let genesis = Block::genesis();
        assert!(genesis.has_valid_structure());

        let mut bad_hash = genesis.clone();
        bad_hash.hash = "not-hex".to_string();
        assert!(!bad_hash.has_valid_structure());

        let mut no_txs = genesis.clone();
        no_txs.transactions.clear();
        assert!(!no_txs.has_valid_structure());
    }
}
