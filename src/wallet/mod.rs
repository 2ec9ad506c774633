//! Wallet management and key handling
//!
//! One persistent keypair per node: address derivation, balance queries,
//! and assembly of signed spend transactions.

#[allow(clippy::module_inception)]
pub mod wallet;

pub use wallet::{get_balance, is_valid_address, Wallet};
