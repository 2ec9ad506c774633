//! Error handling for the ledger node
//!
//! Every validation failure is a pure rejection: the operation that
//! produced it leaves chain, projection, and mempool untouched.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error taxonomy for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// A block or transaction fails the shape checks
    StructuralInvalid(String),
    /// A transaction input references an output missing from the projection
    ReferenceNotFound { tx_out_id: String, tx_out_index: u64 },
    /// The signer's derived address differs from the referenced output's owner
    OwnershipMismatch(String),
    /// Input amounts and output amounts of a transaction do not balance
    AmountMismatch { inputs: u64, outputs: u64 },
    /// Two transactions in one block consume the same output
    DuplicateInput { tx_out_id: String, tx_out_index: u64 },
    /// A submitted transaction consumes an output already claimed in the mempool
    ConflictingInput { tx_out_id: String, tx_out_index: u64 },
    /// A candidate block does not extend the tip it was validated against
    ChainDiscontinuity(String),
    /// Spendable outputs do not cover the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// A peer sent something that does not decode or validate
    InvalidPeerMessage(String),
    /// Block-level validation errors
    InvalidBlock(String),
    /// Invalid address format
    InvalidAddress(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Network communication errors
    Network(String),
    /// Wallet operation errors
    Wallet(String),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::StructuralInvalid(msg) => write!(f, "Structurally invalid: {msg}"),
            BlockchainError::ReferenceNotFound {
                tx_out_id,
                tx_out_index,
            } => {
                write!(f, "Referenced output not found: {tx_out_id}:{tx_out_index}")
            }
            BlockchainError::OwnershipMismatch(msg) => write!(f, "Ownership mismatch: {msg}"),
            BlockchainError::AmountMismatch { inputs, outputs } => {
                write!(
                    f,
                    "Amount mismatch: inputs total {inputs}, outputs total {outputs}"
                )
            }
            BlockchainError::DuplicateInput {
                tx_out_id,
                tx_out_index,
            } => {
                write!(f, "Duplicate input in block: {tx_out_id}:{tx_out_index}")
            }
            BlockchainError::ConflictingInput {
                tx_out_id,
                tx_out_index,
            } => {
                write!(f, "Input already pending: {tx_out_id}:{tx_out_index}")
            }
            BlockchainError::ChainDiscontinuity(msg) => write!(f, "Chain discontinuity: {msg}"),
            BlockchainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            BlockchainError::InvalidPeerMessage(msg) => write!(f, "Invalid peer message: {msg}"),
            BlockchainError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            BlockchainError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            BlockchainError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        BlockchainError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for BlockchainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for BlockchainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        BlockchainError::Serialization(err.to_string())
    }
}
