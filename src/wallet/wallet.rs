use crate::core::transaction::{sign_input, Transaction, TxIn, TxOut};
use crate::error::{BlockchainError, Result};
use crate::storage::{OutPoint, UtxoSet};
use crate::utils::{ecdsa_p256_sha256_sign_digest, new_key_pair, public_key_from_pkcs8};
use data_encoding::HEXLOWER;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Expected address length: hex encoding of an uncompressed public key.
const ADDRESS_LEN: usize = 130;

/// One ECDSA P-256 keypair. The address is the hex-encoded uncompressed
/// public key; the PKCS#8 document is the persisted credential.
#[derive(Clone, Zeroize, ZeroizeOnDrop, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    /// Load the credential file, or create and persist a fresh keypair if
    /// none exists yet.
    pub fn load_or_create(path: &Path) -> Result<Wallet> {
        if path.exists() {
            return Wallet::load_from_file(path);
        }
        let wallet = Wallet::new()?;
        wallet.save_to_file(path)?;
        Ok(wallet)
    }

    pub fn load_from_file(path: &Path) -> Result<Wallet> {
        let mut file = File::open(path)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to open wallet file: {e}")))?;
        let mut buf = vec![];
        file.read_to_end(&mut buf)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to read wallet file: {e}")))?;

        let config = bincode::config::standard();
        let (wallet, _) = bincode::decode_from_slice::<Wallet, _>(&buf, config)?;
        // Reject a credential whose key material no longer parses.
        public_key_from_pkcs8(&wallet.pkcs8)?;
        Ok(wallet)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)
            .map_err(|e| BlockchainError::Wallet(format!("Failed to open wallet file: {e}")))?;
        let mut writer = BufWriter::new(file);
        let config = bincode::config::standard();
        let bytes = bincode::encode_to_vec(self, config)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// The node's own address: hex of the uncompressed public key.
    pub fn address(&self) -> String {
        HEXLOWER.encode(&self.public_key)
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Detached signature over `message`, hex-encoded.
    pub fn sign_hex(&self, message: &[u8]) -> Result<String> {
        let signature = ecdsa_p256_sha256_sign_digest(&self.pkcs8, message)?;
        Ok(HEXLOWER.encode(&signature))
    }

    /// Assemble and sign a spend of `amount` to `recipient`.
    ///
    /// Owned outputs already referenced by a pending mempool input are
    /// excluded, then outputs accumulate in projection iteration order
    /// until the amount is covered (first-fit, no optimization). A change
    /// output back to this wallet is added when anything is left over.
    pub fn build_transaction(
        &self,
        recipient: &str,
        amount: u64,
        utxo_set: &UtxoSet,
        pending: &[Transaction],
    ) -> Result<Transaction> {
        if !is_valid_address(recipient) {
            return Err(BlockchainError::InvalidAddress(recipient.to_string()));
        }
        if amount == 0 {
            return Err(BlockchainError::Wallet(
                "Amount must be positive".to_string(),
            ));
        }

        let claimed: HashSet<OutPoint> = pending
            .iter()
            .flat_map(|tx| tx.tx_ins.iter().map(TxIn::out_point))
            .collect();

        let my_address = self.address();
        let spendable: Vec<_> = utxo_set
            .owned_by(&my_address)
            .into_iter()
            .filter(|utxo| !claimed.contains(&utxo.out_point()))
            .collect();

        let mut accumulated: u64 = 0;
        let mut included = vec![];
        for utxo in &spendable {
            included.push(TxIn::new(&utxo.tx_out_id, utxo.tx_out_index));
            accumulated += utxo.amount;
            if accumulated >= amount {
                break;
            }
        }
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let leftover = accumulated - amount;
        let mut tx_outs = vec![TxOut::new(recipient, amount)];
        if leftover > 0 {
            tx_outs.push(TxOut::new(&my_address, leftover));
        }

        let mut tx = Transaction::new(included, tx_outs);
        for index in 0..tx.tx_ins.len() {
            let signature = sign_input(&tx, index, self, utxo_set)?;
            tx.tx_ins[index].signature = signature;
        }
        Ok(tx)
    }
}

/// Sum of outputs owned by `address` in the given projection.
pub fn get_balance(address: &str, utxo_set: &UtxoSet) -> u64 {
    utxo_set.balance_of(address)
}

/// An address is the hex-encoded uncompressed public key: 130 hex chars
/// with the `04` point prefix.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address.starts_with("04")
        && address.chars().all(|c| c.is_ascii_hexdigit())
}
