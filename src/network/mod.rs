//! Peer-to-peer synchronization
//!
//! JSON `{type, data}` messages over persistent TCP connections. The sync
//! server subscribes to ledger events and is the sole broadcaster; inbound
//! peer data flows back through the chain manager's APIs.

pub mod message;
pub mod peer;
pub mod server;

pub use message::PeerMessage;
pub use peer::{PeerConnection, Peers};
pub use server::{chain_response_action, SyncAction, SyncServer};
