//! Core consensus and ledger functionality
//!
//! Blocks, transactions, the chain manager, proof-of-work mining, and
//! difficulty retargeting.

pub mod block;
pub mod chain;
pub mod difficulty;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_ADDRESS};
pub use chain::{total_work, validate_block, validate_chain, Blockchain, LedgerEvent};
pub use difficulty::{BLOCK_GENERATION_INTERVAL, DIFFICULTY_ADJUSTMENT_INTERVAL};
pub use proof_of_work::{hash_matches_difficulty, ProofOfWork};
pub use transaction::{Transaction, TxIn, TxOut, COINBASE_AMOUNT};
