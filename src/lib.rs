//! # Emberchain
//!
//! A single-process, peer-replicated ledger node: proof-of-work consensus
//! over a UTXO value model, with an in-memory chain that every restart
//! rebuilds from the fixed genesis block.
//!
//! ## What's inside
//! - **Consensus core**: block structure, proof-of-work mining with
//!   retargeting difficulty, and heaviest-valid-chain fork choice
//! - **UTXO engine**: signature-gated ownership transfer with strict value
//!   conservation, applied batch-wise per block
//! - **Mempool**: insertion-ordered pending transactions with a
//!   double-spend guard, reconciled on every projection change
//! - **Peer sync**: JSON messages over persistent TCP connections,
//!   eventually consistent through request/response round-trips
//! - **Wallet**: one ECDSA P-256 keypair, hex-pubkey addresses, first-fit
//!   coin selection
//!
//! ## How the pieces connect
//! The chain manager in `core::chain` owns chain, projection, and mempool
//! under a single lock and emits events after successful mutations. The
//! sync layer subscribes to those events and is the only component that
//! talks to peers. An HTTP front-end, if any, sits on top of the public
//! `Blockchain` API; it is intentionally not part of this crate.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    hash_matches_difficulty, total_work, validate_block, validate_chain, Block, Blockchain,
    LedgerEvent, ProofOfWork, Transaction, TxIn, TxOut, COINBASE_AMOUNT, GENESIS_ADDRESS,
};
pub use error::{BlockchainError, Result};
pub use network::{chain_response_action, PeerMessage, Peers, SyncAction, SyncServer};
pub use storage::{MemoryPool, OutPoint, UnspentOutput, UtxoSet};
pub use utils::{current_timestamp, sha256_digest, sha256_hex};
pub use wallet::{get_balance, is_valid_address, Wallet};
