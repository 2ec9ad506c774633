// Transaction engine for the UTXO value model. A transaction consumes
// previously-created outputs and creates new ones; apply_batch turns a
// block's transactions into the next UTXO projection without ever touching
// the old one.

use crate::error::{BlockchainError, Result};
use crate::storage::{OutPoint, UnspentOutput, UtxoSet};
use crate::utils::{ecdsa_p256_sha256_sign_verify, sha256_hex};
use crate::wallet::{is_valid_address, Wallet};
use data_encoding::HEXLOWER_PERMISSIVE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Fixed reward carried by every coinbase transaction.
pub const COINBASE_AMOUNT: u64 = 50;

/// Reference to a prior output, plus the owner's signature over the
/// spending transaction's id. Coinbase inputs carry an empty tx_out_id and
/// an empty signature, and use tx_out_index to hold the block index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub signature: String,
}

impl TxIn {
    pub fn new(tx_out_id: &str, tx_out_index: u64) -> TxIn {
        TxIn {
            tx_out_id: tx_out_id.to_string(),
            tx_out_index,
            signature: String::new(),
        }
    }

    pub fn out_point(&self) -> OutPoint {
        OutPoint::new(&self.tx_out_id, self.tx_out_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: &str, amount: u64) -> TxOut {
        TxOut {
            address: address.to_string(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Assemble a transaction from inputs and outputs, stamping its id.
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Transaction {
        let mut tx = Transaction {
            id: String::new(),
            tx_ins,
            tx_outs,
        };
        tx.id = tx.compute_id();
        tx
    }

    /// The block-reward transaction: one sentinel input holding the block
    /// index, one output of the fixed reward.
    pub fn new_coinbase(address: &str, block_index: u64) -> Transaction {
        Transaction::new(
            vec![TxIn::new("", block_index)],
            vec![TxOut::new(address, COINBASE_AMOUNT)],
        )
    }

    /// Content hash over inputs then outputs, in order. Any byte change in
    /// either list changes the id.
    pub fn compute_id(&self) -> String {
        let mut content = String::new();
        for tx_in in &self.tx_ins {
            content.push_str(&tx_in.tx_out_id);
            content.push_str(&tx_in.tx_out_index.to_string());
        }
        for tx_out in &self.tx_outs {
            content.push_str(&tx_out.address);
            content.push_str(&tx_out.amount.to_string());
        }
        sha256_hex(content.as_bytes())
    }

    /// A coinbase-shaped transaction: single input with no real reference.
    pub fn is_coinbase(&self) -> bool {
        self.tx_ins.len() == 1 && self.tx_ins[0].tx_out_id.is_empty()
    }

    fn check_structure(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(BlockchainError::StructuralInvalid(
                "transaction has no id".to_string(),
            ));
        }
        if self.tx_ins.is_empty() {
            return Err(BlockchainError::StructuralInvalid(
                "transaction has no inputs".to_string(),
            ));
        }
        if self.tx_outs.is_empty() {
            return Err(BlockchainError::StructuralInvalid(
                "transaction has no outputs".to_string(),
            ));
        }
        for tx_out in &self.tx_outs {
            if !is_valid_address(&tx_out.address) {
                return Err(BlockchainError::InvalidAddress(tx_out.address.clone()));
            }
        }
        Ok(())
    }

    /// Full validation of a non-coinbase transaction against the current
    /// projection: structure, id integrity, input existence, signatures,
    /// and value conservation. Rejection has no partial effect.
    pub fn verify(&self, utxo_set: &UtxoSet) -> Result<()> {
        self.check_structure()?;

        if self.compute_id() != self.id {
            return Err(BlockchainError::StructuralInvalid(
                "transaction id does not match content".to_string(),
            ));
        }

        let mut input_total: u64 = 0;
        for tx_in in &self.tx_ins {
            let referenced = utxo_set.get(&tx_in.out_point()).ok_or_else(|| {
                BlockchainError::ReferenceNotFound {
                    tx_out_id: tx_in.tx_out_id.clone(),
                    tx_out_index: tx_in.tx_out_index,
                }
            })?;

            let owner_key = HEXLOWER_PERMISSIVE
                .decode(referenced.address.as_bytes())
                .map_err(|_| BlockchainError::InvalidAddress(referenced.address.clone()))?;
            let signature = HEXLOWER_PERMISSIVE
                .decode(tx_in.signature.as_bytes())
                .map_err(|_| {
                    BlockchainError::OwnershipMismatch(format!(
                        "signature on input {}:{} is not valid hex",
                        tx_in.tx_out_id, tx_in.tx_out_index
                    ))
                })?;

            if !ecdsa_p256_sha256_sign_verify(&owner_key, &signature, self.id.as_bytes()) {
                return Err(BlockchainError::OwnershipMismatch(format!(
                    "signature on input {}:{} does not verify under the owner address",
                    tx_in.tx_out_id, tx_in.tx_out_index
                )));
            }

            input_total = input_total.checked_add(referenced.amount).ok_or_else(|| {
                BlockchainError::StructuralInvalid("input amount overflow".to_string())
            })?;
        }

        let mut output_total: u64 = 0;
        for tx_out in &self.tx_outs {
            output_total = output_total.checked_add(tx_out.amount).ok_or_else(|| {
                BlockchainError::StructuralInvalid("output amount overflow".to_string())
            })?;
        }

        if input_total != output_total {
            return Err(BlockchainError::AmountMismatch {
                inputs: input_total,
                outputs: output_total,
            });
        }

        Ok(())
    }

    /// Coinbase validation: id integrity, exactly one sentinel input whose
    /// index equals the containing block's index, exactly one output of
    /// the fixed reward.
    pub fn validate_coinbase(&self, block_index: u64) -> Result<()> {
        if self.compute_id() != self.id {
            return Err(BlockchainError::StructuralInvalid(
                "coinbase id does not match content".to_string(),
            ));
        }
        if self.tx_ins.len() != 1 {
            return Err(BlockchainError::StructuralInvalid(
                "coinbase must have exactly one input".to_string(),
            ));
        }
        if self.tx_ins[0].tx_out_index != block_index {
            return Err(BlockchainError::StructuralInvalid(format!(
                "coinbase input index {} does not equal block index {}",
                self.tx_ins[0].tx_out_index, block_index
            )));
        }
        if self.tx_outs.len() != 1 {
            return Err(BlockchainError::StructuralInvalid(
                "coinbase must have exactly one output".to_string(),
            ));
        }
        if self.tx_outs[0].amount != COINBASE_AMOUNT {
            return Err(BlockchainError::StructuralInvalid(format!(
                "coinbase amount {} does not equal the fixed reward {}",
                self.tx_outs[0].amount, COINBASE_AMOUNT
            )));
        }
        Ok(())
    }
}

/// Sign one input of `tx` with the wallet's key, returning the detached
/// hex signature over the transaction id. The referenced output must exist
/// and must be owned by the wallet's derived address.
pub fn sign_input(
    tx: &Transaction,
    input_index: usize,
    wallet: &Wallet,
    utxo_set: &UtxoSet,
) -> Result<String> {
    let tx_in = tx.tx_ins.get(input_index).ok_or_else(|| {
        BlockchainError::StructuralInvalid(format!("no input at index {input_index}"))
    })?;

    let referenced =
        utxo_set
            .get(&tx_in.out_point())
            .ok_or_else(|| BlockchainError::ReferenceNotFound {
                tx_out_id: tx_in.tx_out_id.clone(),
                tx_out_index: tx_in.tx_out_index,
            })?;

    if referenced.address != wallet.address() {
        return Err(BlockchainError::OwnershipMismatch(format!(
            "output {}:{} is not owned by this wallet",
            tx_in.tx_out_id, tx_in.tx_out_index
        )));
    }

    wallet.sign_hex(tx.id.as_bytes())
}

/// Apply a block's transactions to the projection, producing the next one.
/// The first transaction must be a valid coinbase for `block_index`; no two
/// inputs in the batch may consume the same output; every other transaction
/// must pass `verify`. The input set is never modified.
pub fn apply_batch(
    transactions: &[Transaction],
    utxo_set: &UtxoSet,
    block_index: u64,
) -> Result<UtxoSet> {
    let coinbase = transactions.first().ok_or_else(|| {
        BlockchainError::StructuralInvalid("block carries no transactions".to_string())
    })?;
    coinbase.validate_coinbase(block_index)?;

    let mut seen: HashSet<OutPoint> = HashSet::new();
    for tx in transactions {
        for tx_in in &tx.tx_ins {
            if !seen.insert(tx_in.out_point()) {
                return Err(BlockchainError::DuplicateInput {
                    tx_out_id: tx_in.tx_out_id.clone(),
                    tx_out_index: tx_in.tx_out_index,
                });
            }
        }
    }

    for tx in &transactions[1..] {
        if tx.is_coinbase() {
            return Err(BlockchainError::StructuralInvalid(
                "only the first transaction of a block may be a coinbase".to_string(),
            ));
        }
        tx.verify(utxo_set)?;
    }

    let mut next = utxo_set.clone();
    for tx in transactions {
        if !tx.is_coinbase() {
            for tx_in in &tx.tx_ins {
                next.remove(&tx_in.out_point());
            }
        }
        for (index, tx_out) in tx.tx_outs.iter().enumerate() {
            next.insert(UnspentOutput {
                tx_out_id: tx.id.clone(),
                tx_out_index: index as u64,
                address: tx_out.address.clone(),
                amount: tx_out.amount,
            });
        }
    }
    Ok(next)
}
