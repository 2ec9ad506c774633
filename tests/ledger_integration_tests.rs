//! Ledger integration tests
//!
//! End-to-end checks of the consensus core: balances, spending, fork
//! choice, and double-spend handling across the public `Blockchain` API.

use emberchain::{
    current_timestamp, validate_chain, Block, Blockchain, BlockchainError, Transaction, Wallet,
    COINBASE_AMOUNT, GENESIS_ADDRESS,
};

fn test_node() -> Blockchain {
    Blockchain::new(Wallet::new().unwrap()).unwrap()
}

#[test]
fn test_genesis_funds_the_well_known_address() {
    let node = test_node();

    assert_eq!(node.balance_of(GENESIS_ADDRESS), COINBASE_AMOUNT);
    assert_eq!(node.utxo_snapshot().len(), 1);
    assert_eq!(node.blocks().len(), 1);
}

#[test]
fn test_spend_splits_into_payment_and_change() {
    let node = test_node();
    let recipient = Wallet::new().unwrap();

    // Fund the node wallet with one mined reward, then spend 30 of it.
    node.mine_block().unwrap();
    assert_eq!(node.account_balance(), 50);

    let tx = node.send_transaction(&recipient.address(), 30).unwrap();
    assert_eq!(tx.tx_outs.len(), 2);
    assert_eq!(tx.tx_outs[0].address, recipient.address());
    assert_eq!(tx.tx_outs[0].amount, 30);
    assert_eq!(tx.tx_outs[1].address, node.address());
    assert_eq!(tx.tx_outs[1].amount, 20);

    // Including it leaves 20 spendable from the old reward, plus the new one.
    node.mine_block().unwrap();
    assert_eq!(node.balance_of(&recipient.address()), 30);
    assert_eq!(node.account_balance(), 20 + COINBASE_AMOUNT);
}

#[test]
fn test_double_spend_is_stopped_at_both_gates() {
    let wallet = Wallet::new().unwrap();
    let node = Blockchain::new(wallet.clone()).unwrap();
    let recipient = Wallet::new().unwrap();
    node.mine_block().unwrap();

    // Two independent spends of the same funding output, built against the
    // same snapshot with no knowledge of each other.
    let snapshot = node.utxo_snapshot();
    let first = wallet
        .build_transaction(&recipient.address(), 10, &snapshot, &[])
        .unwrap();
    let second = wallet
        .build_transaction(&recipient.address(), 20, &snapshot, &[])
        .unwrap();

    // Gate one: the mempool refuses the conflicting submission.
    node.handle_incoming_transaction(first.clone()).unwrap();
    assert!(matches!(
        node.handle_incoming_transaction(second.clone()),
        Err(BlockchainError::ConflictingInput { .. })
    ));

    // Gate two: a block smuggling both spends is rejected on append.
    let tip = node.latest_block();
    let coinbase = Transaction::new_coinbase(&node.address(), tip.get_index() + 1);
    let block = Block::new(
        tip.get_index() + 1,
        tip.get_hash().to_string(),
        current_timestamp().unwrap(),
        vec![coinbase, first, second],
        0,
        0,
    )
    .unwrap();
    assert!(matches!(
        node.append_block(&block),
        Err(BlockchainError::DuplicateInput { .. })
    ));
    assert_eq!(node.latest_block().get_hash(), tip.get_hash());
}

#[test]
fn test_replay_from_genesis_matches_live_projection() {
    let node = test_node();
    let recipient = Wallet::new().unwrap();

    node.mine_block().unwrap();
    node.send_transaction(&recipient.address(), 12).unwrap();
    node.mine_block().unwrap();
    node.send_transaction(&recipient.address(), 7).unwrap();
    node.mine_block().unwrap();

    let replayed = validate_chain(&node.blocks()).unwrap();
    assert_eq!(replayed, node.utxo_snapshot());
}

#[test]
fn test_chain_validation_rejects_a_tampered_history() {
    let node = test_node();
    let recipient = Wallet::new().unwrap();
    node.mine_block().unwrap();
    node.send_transaction(&recipient.address(), 12).unwrap();
    node.mine_block().unwrap();

    let mut forged = node.blocks();
    // Rewrite history: inflate the payment inside an already-mined block.
    let mut value = serde_json::to_value(&forged[2]).unwrap();
    value["transactions"][1]["tx_outs"][0]["amount"] = serde_json::json!(40);
    forged[2] = serde_json::from_value(value).unwrap();

    assert!(validate_chain(&forged).is_err());
}
