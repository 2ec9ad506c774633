use crate::error::{BlockchainError, Result};
use crate::network::message::PeerMessage;
use log::{info, warn};
use std::io::Write;
use std::net::TcpStream;
use std::sync::{Arc, Mutex, RwLock};

/// One connected remote node. The stream handle is shared so broadcasts
/// and per-peer replies serialize their writes through the same mutex.
#[derive(Clone)]
pub struct PeerConnection {
    addr: String,
    stream: Arc<Mutex<TcpStream>>,
}

impl PeerConnection {
    pub fn new(addr: String, stream: TcpStream) -> PeerConnection {
        PeerConnection {
            addr,
            stream: Arc::new(Mutex::new(stream)),
        }
    }

    pub fn get_addr(&self) -> String {
        self.addr.clone()
    }

    pub fn send(&self, message: &PeerMessage) -> Result<()> {
        let stream = self.stream.lock().expect("peer stream lock poisoned");
        serde_json::to_writer(&*stream, message)
            .map_err(|e| BlockchainError::Network(format!("Failed to send to {}: {e}", self.addr)))?;
        (&*stream)
            .flush()
            .map_err(|e| BlockchainError::Network(format!("Failed to flush to {}: {e}", self.addr)))?;
        Ok(())
    }
}

/// The active peer set. Peers are added on connection open and removed on
/// transport close or write failure; there is no automatic reconnect.
pub struct Peers {
    inner: RwLock<Vec<PeerConnection>>,
}

impl Default for Peers {
    fn default() -> Self {
        Self::new()
    }
}

impl Peers {
    pub fn new() -> Peers {
        Peers {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add(&self, peer: PeerConnection) {
        let mut inner = self.inner.write().expect("peer registry lock poisoned");
        if !inner.iter().any(|p| p.get_addr() == peer.get_addr()) {
            inner.push(peer);
        }
    }

    pub fn remove(&self, addr: &str) {
        let mut inner = self.inner.write().expect("peer registry lock poisoned");
        if let Some(index) = inner.iter().position(|p| p.get_addr() == addr) {
            inner.remove(index);
            info!("Removed peer {addr}");
        }
    }

    pub fn is_known(&self, addr: &str) -> bool {
        self.inner
            .read()
            .expect("peer registry lock poisoned")
            .iter()
            .any(|p| p.get_addr() == addr)
    }

    pub fn get_all(&self) -> Vec<PeerConnection> {
        self.inner
            .read()
            .expect("peer registry lock poisoned")
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("peer registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .expect("peer registry lock poisoned")
            .is_empty()
    }

    /// Best-effort send to every peer, no acknowledgement. A peer whose
    /// write fails is pruned from the set.
    pub fn broadcast(&self, message: &PeerMessage) {
        for peer in self.get_all() {
            if let Err(e) = peer.send(message) {
                warn!("Dropping unreachable peer {}: {e}", peer.get_addr());
                self.remove(&peer.get_addr());
            }
        }
    }
}
