// Peer synchronization: gossips blocks and mempool contents over
// persistent TCP connections and drives reconciliation through the chain
// manager's APIs. This layer is the sole broadcaster; it learns about
// local mutations by subscribing to ledger events.

use crate::core::{Block, Blockchain, LedgerEvent, Transaction};
use crate::error::{BlockchainError, Result};
use crate::network::message::PeerMessage;
use crate::network::peer::{PeerConnection, Peers};
use log::{error, info, warn};
use serde_json::Deserializer;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Delay between the opening tip request and the mempool request.
const MEMPOOL_REQUEST_DELAY: Duration = Duration::from_millis(1000);
/// Keep-alive heartbeat period.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// What to do with a `ChainResponse`, decided before any state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Malformed response; drop it.
    Discard,
    /// The peer is not ahead of us.
    Ignore,
    /// Exactly one ahead of our tip; try a plain append.
    Append,
    /// Further ahead but only the tip was sent; ask for the whole chain.
    RequestFullChain,
    /// Further ahead with history attached; try a full replacement.
    Replace,
}

/// Classify a peer's `ChainResponse` against the local tip.
pub fn chain_response_action(local_tip: &Block, blocks: &[Block]) -> SyncAction {
    let newest = match blocks.last() {
        Some(block) => block,
        None => return SyncAction::Discard,
    };
    if !newest.has_valid_structure() {
        return SyncAction::Discard;
    }
    if newest.get_index() <= local_tip.get_index() {
        return SyncAction::Ignore;
    }
    if newest.get_previous_hash() == local_tip.get_hash() {
        return SyncAction::Append;
    }
    if blocks.len() == 1 {
        return SyncAction::RequestFullChain;
    }
    SyncAction::Replace
}

pub struct SyncServer {
    blockchain: Arc<Blockchain>,
    peers: Arc<Peers>,
}

impl SyncServer {
    pub fn new(blockchain: Arc<Blockchain>) -> SyncServer {
        let server = SyncServer {
            blockchain,
            peers: Arc::new(Peers::new()),
        };
        server.start_event_pump();
        server.start_keep_alive();
        server
    }

    pub fn peers(&self) -> Arc<Peers> {
        Arc::clone(&self.peers)
    }

    /// Bind the listener and start accepting inbound peers in the
    /// background. Returns the bound address.
    pub fn start(&self, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to bind to {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to read local addr: {e}")))?;
        info!("Sync server listening on {local_addr}");

        let blockchain = Arc::clone(&self.blockchain);
        let peers = Arc::clone(&self.peers);
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Err(e) = Self::register_connection(&blockchain, &peers, stream) {
                            error!("Failed to register inbound peer: {e}");
                        }
                    }
                    Err(e) => error!("Error accepting connection: {e}"),
                }
            }
        });
        Ok(local_addr)
    }

    /// Outbound connection to a remote node; the lifecycle is identical to
    /// an inbound one.
    pub fn connect_to_peer(&self, addr: &str) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| BlockchainError::Network(format!("Failed to connect to {addr}: {e}")))?;
        Self::register_connection(&self.blockchain, &self.peers, stream)
    }

    fn register_connection(
        blockchain: &Arc<Blockchain>,
        peers: &Arc<Peers>,
        stream: TcpStream,
    ) -> Result<()> {
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| BlockchainError::Network(format!("Failed to read peer addr: {e}")))?
            .to_string();
        let reader = stream
            .try_clone()
            .map_err(|e| BlockchainError::Network(format!("Failed to clone stream: {e}")))?;

        let peer = PeerConnection::new(peer_addr.clone(), stream);
        peers.add(peer.clone());
        info!("Peer connected: {peer_addr}");

        // On open: ask for the tip immediately, the mempool shortly after.
        if let Err(e) = peer.send(&PeerMessage::GetLatestBlock) {
            peers.remove(&peer_addr);
            return Err(e);
        }
        {
            let peer = peer.clone();
            let peers = Arc::clone(peers);
            thread::spawn(move || {
                thread::sleep(MEMPOOL_REQUEST_DELAY);
                if peers.is_known(&peer.get_addr()) && peer.send(&PeerMessage::RequestMempool).is_err()
                {
                    peers.remove(&peer.get_addr());
                }
            });
        }

        let blockchain = Arc::clone(blockchain);
        let peers = Arc::clone(peers);
        thread::spawn(move || {
            Self::handle_messages(&blockchain, &peer, reader);
            peers.remove(&peer.get_addr());
            info!("Peer disconnected: {}", peer.get_addr());
        });
        Ok(())
    }

    /// Read loop for one peer. A transport error or an undecodable message
    /// ends the loop, which drops the peer.
    fn handle_messages(blockchain: &Blockchain, peer: &PeerConnection, stream: TcpStream) {
        let reader = BufReader::new(stream);
        let messages = Deserializer::from_reader(reader).into_iter::<PeerMessage>();
        for message in messages {
            match message {
                Ok(message) => {
                    if let Err(e) = Self::dispatch(blockchain, peer, message) {
                        warn!("Error handling message from {}: {e}", peer.get_addr());
                    }
                }
                Err(e) => {
                    warn!("Undecodable message from {}: {e}", peer.get_addr());
                    break;
                }
            }
        }
    }

    fn dispatch(blockchain: &Blockchain, peer: &PeerConnection, message: PeerMessage) -> Result<()> {
        match message {
            PeerMessage::GetLatestBlock => {
                peer.send(&PeerMessage::ChainResponse(vec![blockchain.latest_block()]))
            }
            PeerMessage::GetFullChain => {
                peer.send(&PeerMessage::ChainResponse(blockchain.blocks()))
            }
            PeerMessage::ChainResponse(blocks) => {
                Self::handle_chain_response(blockchain, peer, blocks)
            }
            PeerMessage::RequestMempool => peer.send(&PeerMessage::MempoolResponse(
                blockchain.mempool_snapshot(),
            )),
            PeerMessage::MempoolResponse(transactions) => {
                Self::handle_mempool_response(blockchain, transactions);
                Ok(())
            }
            PeerMessage::Ping => Ok(()),
        }
    }

    /// Reconcile against a peer's view of the chain. Successful appends
    /// and replacements broadcast the new tip through the event path; a
    /// rejected candidate is a logged no-op.
    fn handle_chain_response(
        blockchain: &Blockchain,
        peer: &PeerConnection,
        blocks: Vec<Block>,
    ) -> Result<()> {
        match chain_response_action(&blockchain.latest_block(), &blocks) {
            SyncAction::Discard => Err(BlockchainError::InvalidPeerMessage(format!(
                "chain response from {} failed the structural check",
                peer.get_addr()
            ))),
            SyncAction::Ignore => Ok(()),
            SyncAction::Append => {
                let newest = blocks.last().expect("classified response is non-empty");
                if let Err(e) = blockchain.append_block(newest) {
                    info!("Rejected block from {}: {e}", peer.get_addr());
                }
                Ok(())
            }
            SyncAction::RequestFullChain => peer.send(&PeerMessage::GetFullChain),
            SyncAction::Replace => {
                if let Err(e) = blockchain.replace_chain(blocks) {
                    info!("Rejected candidate chain from {}: {e}", peer.get_addr());
                }
                Ok(())
            }
        }
    }

    /// Admit each peer transaction independently; one rejection does not
    /// abort the batch. Acceptances broadcast through the event path.
    fn handle_mempool_response(blockchain: &Blockchain, transactions: Vec<Transaction>) {
        for tx in transactions {
            let id = tx.id.clone();
            if let Err(e) = blockchain.handle_incoming_transaction(tx) {
                info!("Rejected peer transaction {id}: {e}");
            }
        }
    }

    /// Forward ledger events to the wire: the new tip on chain changes,
    /// the pool contents on mempool changes.
    fn start_event_pump(&self) {
        let events = self.blockchain.subscribe();
        let blockchain = Arc::clone(&self.blockchain);
        let peers = Arc::clone(&self.peers);
        thread::spawn(move || {
            for event in events {
                match event {
                    LedgerEvent::ChainChanged => {
                        peers.broadcast(&PeerMessage::ChainResponse(vec![
                            blockchain.latest_block()
                        ]));
                    }
                    LedgerEvent::MempoolChanged => {
                        peers.broadcast(&PeerMessage::MempoolResponse(
                            blockchain.mempool_snapshot(),
                        ));
                    }
                }
            }
        });
    }

    fn start_keep_alive(&self) {
        let peers = Arc::clone(&self.peers);
        thread::spawn(move || loop {
            thread::sleep(KEEP_ALIVE_INTERVAL);
            if !peers.is_empty() {
                peers.broadcast(&PeerMessage::Ping);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::proof_of_work::ProofOfWork;
    use crate::core::transaction::Transaction;
    use crate::utils::current_timestamp;
    use crate::wallet::Wallet;
    use std::sync::atomic::AtomicBool;

    fn extension(tip: &Block, difficulty: u32) -> Block {
        let address = Wallet::new().unwrap().address();
        let coinbase = Transaction::new_coinbase(&address, tip.get_index() + 1);
        let pow = ProofOfWork::new(
            tip.get_index() + 1,
            tip.get_hash().to_string(),
            current_timestamp().unwrap(),
            vec![coinbase],
            difficulty,
        );
        pow.run(&AtomicBool::new(false)).unwrap().unwrap()
    }

    #[test]
    fn test_empty_or_malformed_response_is_discarded() {
        let genesis = Block::genesis();
        assert_eq!(chain_response_action(&genesis, &[]), SyncAction::Discard);

        let good = extension(&genesis, 0);
        let mut value = serde_json::to_value(&good).unwrap();
        value["hash"] = serde_json::Value::String("xyz".to_string());
        let mangled: Block = serde_json::from_value(value).unwrap();
        assert_eq!(
            chain_response_action(&genesis, &[mangled]),
            SyncAction::Discard
        );
    }

    #[test]
    fn test_stale_tip_is_ignored() {
        let genesis = Block::genesis();
        let next = extension(&genesis, 0);

        // A peer announcing our own tip height or less says nothing new.
        assert_eq!(
            chain_response_action(&next, &[genesis.clone(), next.clone()]),
            SyncAction::Ignore
        );
        assert_eq!(
            chain_response_action(&next, &[genesis]),
            SyncAction::Ignore
        );
    }

    #[test]
    fn test_direct_successor_is_appended() {
        let genesis = Block::genesis();
        let next = extension(&genesis, 0);
        assert_eq!(chain_response_action(&genesis, &[next]), SyncAction::Append);
    }

    #[test]
    fn test_disconnected_single_block_requests_the_full_chain() {
        // The peer is further ahead and we only saw its tip: previous_hash
        // matches nothing we hold, so the whole chain must be fetched.
        let genesis = Block::genesis();
        let foreign_parent = extension(&genesis, 0);
        let foreign_tip = extension(&foreign_parent, 0);

        assert_eq!(
            chain_response_action(&genesis, &[foreign_tip]),
            SyncAction::RequestFullChain
        );
    }

    #[test]
    fn test_full_foreign_chain_goes_to_replacement() {
        let genesis = Block::genesis();
        let a = extension(&genesis, 0);
        let b = extension(&a, 0);

        assert_eq!(
            chain_response_action(&genesis, &[genesis.clone(), a, b]),
            SyncAction::Replace
        );
    }
}
