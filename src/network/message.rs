use crate::core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Wire envelope exchanged between peers: `{"type": ..., "data": ...}`.
/// Every message is stateless and idempotent on repeat; `Ping` only keeps
/// the connection warm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PeerMessage {
    GetLatestBlock,
    GetFullChain,
    ChainResponse(Vec<Block>),
    RequestMempool,
    MempoolResponse(Vec<Transaction>),
    Ping,
}
