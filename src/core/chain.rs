// Chain manager: the single owner of chain, UTXO projection, and mempool.
// Every mutating operation takes the one write lock for its whole critical
// section, so mining results and peer messages never interleave their
// updates. Listeners learn about successful mutations through events; this
// module never calls into the network layer.

use crate::core::block::Block;
use crate::core::difficulty::next_difficulty;
use crate::core::proof_of_work::ProofOfWork;
use crate::core::transaction::{apply_batch, Transaction};
use crate::error::{BlockchainError, Result};
use crate::storage::{MemoryPool, UtxoSet};
use crate::utils::current_timestamp;
use crate::wallet::Wallet;
use log::info;
use num_bigint::BigUint;
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::RwLock;

/// Seconds of clock skew tolerated around a block's timestamp.
const TIMESTAMP_TOLERANCE: i64 = 60;

/// Emitted after a successful mutation. The sync layer subscribes and is
/// the sole broadcaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    ChainChanged,
    MempoolChanged,
}

struct ChainState {
    blocks: Vec<Block>,
    utxo_set: UtxoSet,
    mempool: MemoryPool,
}

pub struct Blockchain {
    state: RwLock<ChainState>,
    subscribers: RwLock<Vec<Sender<LedgerEvent>>>,
    wallet: Wallet,
}

impl Blockchain {
    /// A fresh node: the hard-coded genesis block and the projection its
    /// single coinbase produces.
    pub fn new(wallet: Wallet) -> Result<Blockchain> {
        let genesis = Block::genesis();
        let utxo_set = apply_batch(genesis.get_transactions(), &UtxoSet::new(), 0)?;
        Ok(Blockchain {
            state: RwLock::new(ChainState {
                blocks: vec![genesis],
                utxo_set,
                mempool: MemoryPool::new(),
            }),
            subscribers: RwLock::new(vec![]),
            wallet,
        })
    }

    /// Register a listener for ledger events.
    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        let (sender, receiver) = mpsc::channel();
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .push(sender);
        receiver
    }

    fn emit(&self, event: LedgerEvent) {
        self.subscribers
            .write()
            .expect("subscriber lock poisoned")
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ChainState> {
        self.state.read().expect("chain state lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ChainState> {
        self.state.write().expect("chain state lock poisoned")
    }

    pub fn address(&self) -> String {
        self.wallet.address()
    }

    pub fn latest_block(&self) -> Block {
        self.read()
            .blocks
            .last()
            .expect("chain is never empty")
            .clone()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.read().blocks.clone()
    }

    /// One consistent copy of the projection.
    pub fn utxo_snapshot(&self) -> UtxoSet {
        self.read().utxo_set.clone()
    }

    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.read().mempool.snapshot()
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        self.read()
            .blocks
            .iter()
            .find(|block| block.get_hash() == hash)
            .cloned()
    }

    pub fn transaction_by_id(&self, id: &str) -> Option<Transaction> {
        self.read()
            .blocks
            .iter()
            .flat_map(|block| block.get_transactions())
            .find(|tx| tx.id == id)
            .cloned()
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.read().utxo_set.balance_of(address)
    }

    pub fn account_balance(&self) -> u64 {
        let state = self.read();
        state.utxo_set.balance_of(&self.wallet.address())
    }

    /// Build, admit, and announce a spend from the node's own wallet.
    pub fn send_transaction(&self, recipient: &str, amount: u64) -> Result<Transaction> {
        let tx = {
            let state = self.read();
            self.wallet
                .build_transaction(recipient, amount, &state.utxo_set, &state.mempool.snapshot())?
        };
        self.handle_incoming_transaction(tx.clone())?;
        Ok(tx)
    }

    /// Admit a transaction received from a peer or the local API.
    pub fn handle_incoming_transaction(&self, tx: Transaction) -> Result<()> {
        {
            let mut guard = self.write();
            let state = &mut *guard;
            state.mempool.accept(tx, &state.utxo_set)?;
        }
        self.emit(LedgerEvent::MempoolChanged);
        Ok(())
    }

    /// Mine the next block from the current mempool, blocking until found.
    pub fn mine_block(&self) -> Result<Block> {
        match self.mine_block_cancellable(&AtomicBool::new(false))? {
            Some(block) => Ok(block),
            None => Err(BlockchainError::InvalidBlock(
                "mining search ended without a block".to_string(),
            )),
        }
    }

    /// Mine with an external cancellation flag. The candidate is assembled
    /// from a snapshot and the search runs without holding the lock; the
    /// found block re-enters through `append_block`, so an abandoned or
    /// outraced search appends nothing.
    pub fn mine_block_cancellable(&self, cancel: &AtomicBool) -> Result<Option<Block>> {
        let (index, previous_hash, transactions, difficulty) = {
            let state = self.read();
            let tip = state.blocks.last().expect("chain is never empty");
            let index = tip.get_index() + 1;
            let mut transactions = vec![Transaction::new_coinbase(&self.wallet.address(), index)];
            transactions.extend(state.mempool.snapshot());
            (
                index,
                tip.get_hash().to_string(),
                transactions,
                next_difficulty(&state.blocks),
            )
        };

        let pow = ProofOfWork::new(
            index,
            previous_hash,
            current_timestamp()?,
            transactions,
            difficulty,
        );
        match pow.run(cancel)? {
            None => Ok(None),
            Some(block) => {
                self.append_block(&block)?;
                Ok(Some(block))
            }
        }
    }

    /// Validate a candidate against the current tip and apply it: push the
    /// block, swap in the new projection, reconcile the mempool. On any
    /// failure the chain is untouched.
    pub fn append_block(&self, candidate: &Block) -> Result<()> {
        {
            let mut guard = self.write();
            let state = &mut *guard;
            let tip = state.blocks.last().expect("chain is never empty");
            validate_block(candidate, tip)?;

            let next =
                apply_batch(candidate.get_transactions(), &state.utxo_set, candidate.get_index())?;
            state.blocks.push(candidate.clone());
            state.utxo_set = next;
            state.mempool.reconcile(&state.utxo_set);
        }
        info!(
            "Appended block {} at height {}",
            candidate.get_hash(),
            candidate.get_index()
        );
        self.emit(LedgerEvent::ChainChanged);
        Ok(())
    }

    /// Full chain replacement: the candidate must be valid end-to-end and
    /// carry strictly more total work than the local chain. On success the
    /// projection is rebuilt wholesale from the replay and the mempool is
    /// reconciled against it.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<()> {
        let projection = validate_chain(&candidate)?;
        {
            let mut guard = self.write();
            let state = &mut *guard;
            let local_work = total_work(&state.blocks);
            let candidate_work = total_work(&candidate);
            if candidate_work <= local_work {
                return Err(BlockchainError::InvalidBlock(format!(
                    "candidate chain work {candidate_work} does not exceed local work {local_work}"
                )));
            }
            info!(
                "Replacing chain: height {} -> {}, work {local_work} -> {candidate_work}",
                state.blocks.len() - 1,
                candidate.len() - 1
            );
            state.blocks = candidate;
            state.utxo_set = projection;
            state.mempool.reconcile(&state.utxo_set);
        }
        self.emit(LedgerEvent::ChainChanged);
        Ok(())
    }
}

/// Validate one block against the tip it claims to extend: structure,
/// sequential index, hash linkage, content hash integrity, and the
/// timestamp tolerance window (enforced, not merely reported).
pub fn validate_block(candidate: &Block, tip: &Block) -> Result<()> {
    if !candidate.has_valid_structure() {
        return Err(BlockchainError::StructuralInvalid(
            "candidate block fails the shape check".to_string(),
        ));
    }
    if candidate.get_index() != tip.get_index() + 1 {
        return Err(BlockchainError::ChainDiscontinuity(format!(
            "candidate index {} does not follow tip index {}",
            candidate.get_index(),
            tip.get_index()
        )));
    }
    if candidate.get_previous_hash() != tip.get_hash() {
        return Err(BlockchainError::ChainDiscontinuity(
            "candidate previous_hash is not the tip hash".to_string(),
        ));
    }
    if candidate.recompute_hash()? != candidate.get_hash() {
        return Err(BlockchainError::InvalidBlock(
            "stored hash does not match block content".to_string(),
        ));
    }
    let now = current_timestamp()?;
    if candidate.get_timestamp() <= tip.get_timestamp() - TIMESTAMP_TOLERANCE
        || candidate.get_timestamp() >= now + TIMESTAMP_TOLERANCE
    {
        return Err(BlockchainError::InvalidBlock(format!(
            "timestamp {} outside the tolerance window",
            candidate.get_timestamp()
        )));
    }
    Ok(())
}

/// Validate a whole candidate chain: identical genesis, pairwise block
/// validation, and a full transaction replay from an empty projection.
/// Returns the replayed projection; any failure invalidates the whole
/// candidate.
pub fn validate_chain(candidate: &[Block]) -> Result<UtxoSet> {
    if candidate.first() != Some(&Block::genesis()) {
        return Err(BlockchainError::ChainDiscontinuity(
            "candidate chain does not share the genesis block".to_string(),
        ));
    }

    let mut projection = UtxoSet::new();
    for (position, block) in candidate.iter().enumerate() {
        if position > 0 {
            validate_block(block, &candidate[position - 1])?;
        }
        projection = apply_batch(block.get_transactions(), &projection, block.get_index())?;
    }
    Ok(projection)
}

/// Fork-choice metric: Σ 2^difficulty across a chain's blocks.
pub fn total_work(blocks: &[Block]) -> BigUint {
    blocks
        .iter()
        .map(|block| BigUint::from(1u8) << block.get_difficulty())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::GENESIS_ADDRESS;
    use crate::core::transaction::COINBASE_AMOUNT;

    fn test_node() -> Blockchain {
        Blockchain::new(Wallet::new().unwrap()).unwrap()
    }

    fn mined_extension(tip: &Block, address: &str, difficulty: u32) -> Block {
        let coinbase = Transaction::new_coinbase(address, tip.get_index() + 1);
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
    fn test_genesis_projection_holds_the_fixed_reward() {
        let node = test_node();
        assert_eq!(node.balance_of(GENESIS_ADDRESS), COINBASE_AMOUNT);
        assert_eq!(node.utxo_snapshot().len(), 1);
        assert_eq!(node.latest_block().get_index(), 0);
    }

    #[test]
    fn test_mining_appends_and_rewards_the_node_wallet() {
        let node = test_node();
        let block = node.mine_block().unwrap();

        assert_eq!(block.get_index(), 1);
        assert_eq!(node.latest_block().get_hash(), block.get_hash());
        assert_eq!(node.account_balance(), COINBASE_AMOUNT);
    }

    #[test]
    fn test_append_rejects_a_stale_candidate() {
        let node = test_node();
        let stale = mined_extension(&node.latest_block(), &node.address(), 0);
        node.mine_block().unwrap();

        assert!(matches!(
            node.append_block(&stale),
            Err(BlockchainError::ChainDiscontinuity(_))
        ));
    }

    #[test]
    fn test_append_rejects_timestamp_outside_window() {
        let node = test_node();
        let tip = node.latest_block();
        let coinbase = Transaction::new_coinbase(&node.address(), 1);
        let ancient = Block::new(
            1,
            tip.get_hash().to_string(),
            tip.get_timestamp() - TIMESTAMP_TOLERANCE - 1,
            vec![coinbase],
            0,
            0,
        )
        .unwrap();

        assert!(matches!(
            node.append_block(&ancient),
            Err(BlockchainError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_replay_reproduces_live_projection() {
        let node = test_node();
        let recipient = Wallet::new().unwrap();
        node.mine_block().unwrap();
        node.send_transaction(&recipient.address(), 30).unwrap();
        node.mine_block().unwrap();

        let replayed = validate_chain(&node.blocks()).unwrap();
        assert_eq!(replayed, node.utxo_snapshot());
    }

    #[test]
    fn test_replace_chain_requires_strictly_more_work() {
        let node = test_node();
        let genesis = node.latest_block();

        let heavy = vec![genesis.clone(), mined_extension(&genesis, &node.address(), 2)];
        let light = vec![genesis.clone(), mined_extension(&genesis, &node.address(), 1)];

        node.replace_chain(heavy.clone()).unwrap();
        assert_eq!(node.latest_block().get_hash(), heavy[1].get_hash());

        // The lighter competitor must not displace it.
        assert!(node.replace_chain(light).is_err());
        assert_eq!(node.latest_block().get_hash(), heavy[1].get_hash());
    }

    #[test]
    fn test_fork_choice_converges_regardless_of_arrival_order() {
        for heavier_first in [true, false] {
            let node = test_node();
            let genesis = node.latest_block();
            let heavy = vec![genesis.clone(), mined_extension(&genesis, &node.address(), 2)];
            let light = vec![genesis.clone(), mined_extension(&genesis, &node.address(), 1)];

            let (first, second) = if heavier_first {
                (heavy.clone(), light.clone())
            } else {
                (light.clone(), heavy.clone())
            };
            let _ = node.replace_chain(first);
            let _ = node.replace_chain(second);

            assert_eq!(node.latest_block().get_hash(), heavy[1].get_hash());
            assert_eq!(total_work(&node.blocks()), total_work(&heavy));
        }
    }

    #[test]
    fn test_mempool_transaction_leaves_pool_when_included() {
        let node = test_node();
        let recipient = Wallet::new().unwrap();
        node.mine_block().unwrap();

        node.send_transaction(&recipient.address(), 30).unwrap();
        assert_eq!(node.mempool_snapshot().len(), 1);

        node.mine_block().unwrap();
        assert!(node.mempool_snapshot().is_empty());
        assert_eq!(node.balance_of(&recipient.address()), 30);
    }

    #[test]
    fn test_events_fire_on_chain_and_mempool_changes() {
        let node = test_node();
        let recipient = Wallet::new().unwrap();
        let events = node.subscribe();

        node.mine_block().unwrap();
        assert_eq!(events.try_recv().unwrap(), LedgerEvent::ChainChanged);

        node.send_transaction(&recipient.address(), 10).unwrap();
        assert_eq!(events.try_recv().unwrap(), LedgerEvent::MempoolChanged);
    }

    #[test]
    fn test_cancelled_mining_appends_nothing() {
        let node = test_node();
        let cancel = AtomicBool::new(true);
        // Push difficulty up so the search cannot finish inside one chunk.
        let result = {
            let tip = node.latest_block();
            let pow = ProofOfWork::new(
                1,
                tip.get_hash().to_string(),
                current_timestamp().unwrap(),
                vec![Transaction::new_coinbase(&node.address(), 1)],
                64,
            );
            pow.run(&cancel).unwrap()
        };
        assert!(result.is_none());
        assert_eq!(node.latest_block().get_index(), 0);
    }
}
