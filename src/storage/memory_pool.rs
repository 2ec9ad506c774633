use crate::core::transaction::Transaction;
use crate::error::{BlockchainError, Result};
use crate::storage::UtxoSet;
use log::info;

/// Pending transactions in insertion order, no priority. Admission
/// revalidates against the current projection and refuses any transaction
/// whose inputs are already claimed by a resident one, so no two resident
/// transactions ever reference the same output.
#[derive(Debug, Default)]
pub struct MemoryPool {
    transactions: Vec<Transaction>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            transactions: vec![],
        }
    }

    /// Admit a transaction: full verification against the projection, then
    /// a conflict scan over every input of every resident transaction.
    pub fn accept(&mut self, tx: Transaction, utxo_set: &UtxoSet) -> Result<()> {
        if tx.is_coinbase() {
            return Err(BlockchainError::StructuralInvalid(
                "coinbase transactions are not accepted into the pool".to_string(),
            ));
        }
        tx.verify(utxo_set)?;

        for tx_in in &tx.tx_ins {
            let out_point = tx_in.out_point();
            let conflicting = self
                .transactions
                .iter()
                .any(|resident| resident.tx_ins.iter().any(|r| r.out_point() == out_point));
            if conflicting {
                return Err(BlockchainError::ConflictingInput {
                    tx_out_id: tx_in.tx_out_id.clone(),
                    tx_out_index: tx_in.tx_out_index,
                });
            }
        }

        info!("Accepted transaction {} into the pool", tx.id);
        self.transactions.push(tx);
        Ok(())
    }

    /// Drop every resident transaction referencing an output no longer in
    /// the projection. Runs after every projection change; this is how
    /// included and invalidated transactions leave the pool.
    pub fn reconcile(&mut self, utxo_set: &UtxoSet) {
        let before = self.transactions.len();
        self.transactions
            .retain(|tx| tx.tx_ins.iter().all(|tx_in| utxo_set.contains(&tx_in.out_point())));
        let dropped = before - self.transactions.len();
        if dropped > 0 {
            info!("Reconciled pool: dropped {dropped} stale transaction(s)");
        }
    }

    /// Independent copy for block assembly or peer responses.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.transactions.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.transactions.iter().any(|tx| tx.id == id)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
