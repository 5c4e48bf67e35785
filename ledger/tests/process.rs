use kestrel_crypto::{derive_address, keypair_from_passphrase};
use kestrel_ledger::{
    create_genesis_block, ApplyContext, GenesisConfig, LedgerError, ProcessTransactions,
    VerifyContext,
};
use kestrel_nullables::NullStore;
use kestrel_store::{Account, AccountStore, BlockRecord, BlockStore, StateStore, TransactionStore};
use kestrel_transactions::{Status, TransactionBuilder, TransactionError, VoteChange};
use kestrel_types::{
    Address, BlockId, ChainParams, KeyPair, NetworkExceptions, Timestamp, UNIT,
};

fn engine() -> ProcessTransactions {
    ProcessTransactions::new(ChainParams::default(), NetworkExceptions::default())
}

fn fund(store: &NullStore, keypair: &KeyPair, balance: u64) -> Address {
    let address = derive_address(&keypair.public);
    let mut account = Account::new(address);
    account.balance = balance;
    account.u_balance = balance;
    account.public_key = Some(keypair.public);
    store.upsert_account(&account).unwrap();
    address
}

fn register_delegate(store: &NullStore, keypair: &KeyPair, username: &str) {
    let address = fund(store, keypair, 0);
    let mut account = store.get_account(&address).unwrap().unwrap();
    account.is_delegate = true;
    account.u_is_delegate = true;
    account.username = Some(username.into());
    account.u_username = Some(username.into());
    store.upsert_account(&account).unwrap();
}

#[test]
fn applying_a_vote_records_the_voter_balance() {
    let store = NullStore::new();
    let engine = engine();
    let voter = keypair_from_passphrase("voter");
    let delegate = keypair_from_passphrase("delegate");
    fund(&store, &voter, 10 * UNIT);
    register_delegate(&store, &delegate, "osprey");

    let vote = TransactionBuilder::vote(vec![VoteChange::add(delegate.public)])
        .sign(&voter, &engine.params().fees);
    let (responses, state) = engine
        .apply_transactions(&store, &[vote.clone()], &ApplyContext::block(5))
        .unwrap();
    assert!(responses[0].is_ok());
    let totals = state.vote_totals(1).unwrap();
    assert_eq!(totals[&delegate.public], (9 * UNIT) as i64);
    assert_eq!(state.pending_transactions(), &[vote.id]);
}

#[test]
fn later_transfers_adjust_existing_votes() {
    let store = NullStore::new();
    let engine = engine();
    let voter = keypair_from_passphrase("voter");
    let delegate = keypair_from_passphrase("delegate");
    let voter_address = fund(&store, &voter, 10 * UNIT);
    register_delegate(&store, &delegate, "osprey");
    let mut account = store.get_account(&voter_address).unwrap().unwrap();
    account.voted_delegates = vec![delegate.public];
    account.u_voted_delegates = vec![delegate.public];
    store.upsert_account(&account).unwrap();

    let transfer = TransactionBuilder::transfer(Address(77), 2 * UNIT).sign(&voter, &engine.params().fees);
    let (_, state) = engine
        .apply_transactions(&store, &[transfer], &ApplyContext::block(150))
        .unwrap();
    let totals = state.vote_totals(2).unwrap();
    assert_eq!(
        totals[&delegate.public],
        -((2 * UNIT + engine.params().fees.transfer) as i64)
    );
}

#[test]
fn undo_cancels_vote_deltas_and_balances() {
    let store = NullStore::new();
    let engine = engine();
    let voter = keypair_from_passphrase("voter");
    let delegate = keypair_from_passphrase("delegate");
    let voter_address = fund(&store, &voter, 10 * UNIT);
    register_delegate(&store, &delegate, "osprey");
    let vote = TransactionBuilder::vote(vec![VoteChange::add(delegate.public)])
        .sign(&voter, &engine.params().fees);
    let transfer = TransactionBuilder::transfer(Address(9), UNIT).sign(&voter, &engine.params().fees);
    let txs = vec![vote, transfer];

    let ctx = ApplyContext::block(3);
    let (responses, state) = engine.apply_transactions(&store, &txs, &ctx).unwrap();
    assert!(responses.iter().all(|r| r.is_ok()));
    state.commit().unwrap();

    let (responses, mut state) = engine.undo_transactions(&store, &txs, &ctx).unwrap();
    assert!(responses.iter().all(|r| r.is_ok()));
    assert_eq!(responses[0].id, txs[1].id);
    assert!(state.vote_totals(1).unwrap().is_empty());
    let account = state.get_account(&voter_address).unwrap();
    assert_eq!(account.balance, 10 * UNIT);
    assert!(account.voted_delegates.is_empty());
}

#[test]
fn failed_transaction_does_not_stop_the_batch() {
    let store = NullStore::new();
    let engine = engine();
    let rich = keypair_from_passphrase("rich");
    let poor = keypair_from_passphrase("poor");
    fund(&store, &rich, 10 * UNIT);
    let fees = &engine.params().fees;
    let txs = vec![
        TransactionBuilder::transfer(Address(1), UNIT).sign(&poor, fees),
        TransactionBuilder::transfer(Address(1), UNIT).sign(&rich, fees),
    ];
    let (responses, mut state) = engine
        .apply_transactions(&store, &txs, &ApplyContext::block(2))
        .unwrap();
    assert_eq!(responses[0].status, Status::Fail);
    assert!(responses[1].is_ok());
    assert_eq!(state.pending_transactions(), &[txs[1].id]);
    assert_eq!(state.get_account(&Address(1)).unwrap().balance, UNIT);
}

#[test]
fn verification_leaves_no_trace() {
    let store = NullStore::new();
    let engine = engine();
    let alice = keypair_from_passphrase("alice");
    let alice_address = fund(&store, &alice, 10 * UNIT);
    let tx = TransactionBuilder::transfer(Address(3), UNIT).sign(&alice, &engine.params().fees);

    let responses = engine
        .verify_transactions(
            &store,
            &[tx],
            &VerifyContext {
                height: 2,
                now: Timestamp::new(100),
                pooled: &[],
            },
        )
        .unwrap();
    assert!(responses[0].is_ok());
    assert_eq!(store.get_account(&alice_address).unwrap().unwrap().balance, 10 * UNIT);
    assert!(store.get_account(&Address(3)).unwrap().is_none());
    assert_eq!(store.batches_written(), 0);
}

#[test]
fn verification_counts_pooled_spending() {
    let store = NullStore::new();
    let engine = engine();
    let alice = keypair_from_passphrase("alice");
    fund(&store, &alice, 2 * UNIT);
    let fees = &engine.params().fees;
    let pooled = vec![TransactionBuilder::transfer(Address(3), UNIT).sign(&alice, fees)];
    let next = TransactionBuilder::transfer(Address(4), UNIT).sign(&alice, fees);

    let ctx = VerifyContext {
        height: 2,
        now: Timestamp::new(100),
        pooled: &pooled,
    };
    let responses = engine.verify_transactions(&store, &[next.clone()], &ctx).unwrap();
    assert!(matches!(
        responses[0].errors[0],
        TransactionError::InsufficientBalance { .. }
    ));

    let alone = VerifyContext { pooled: &[], ..ctx };
    assert!(engine.verify_transactions(&store, &[next], &alone).unwrap()[0].is_ok());
}

#[test]
fn future_transactions_fail_verification() {
    let store = NullStore::new();
    let engine = engine();
    let alice = keypair_from_passphrase("alice");
    fund(&store, &alice, 2 * UNIT);
    let tx = TransactionBuilder::transfer(Address(3), UNIT)
        .timestamp(Timestamp::new(500))
        .sign(&alice, &engine.params().fees);
    let responses = engine
        .verify_transactions(
            &store,
            &[tx],
            &VerifyContext {
                height: 2,
                now: Timestamp::new(100),
                pooled: &[],
            },
        )
        .unwrap();
    assert_eq!(responses[0].errors, vec![TransactionError::TimestampInFuture]);
}

#[test]
fn confirmed_ids_are_flagged() {
    let store = NullStore::new();
    let engine = engine();
    let alice = keypair_from_passphrase("alice");
    let fees = &engine.params().fees;
    let confirmed = TransactionBuilder::transfer(Address(3), UNIT).sign(&alice, fees);
    let fresh = TransactionBuilder::transfer(Address(4), UNIT).sign(&alice, fees);
    let record = BlockRecord {
        id: BlockId(1),
        height: 1,
        previous_block_id: None,
        timestamp: Timestamp::EPOCH,
        generator_public_key: alice.public,
        number_of_transactions: 1,
        total_amount: UNIT,
        total_fee: 0,
        reward: 0,
    };
    store.append_block(&record, b"", &[confirmed.id]).unwrap();

    let responses = engine
        .check_persisted_transactions(&store, &[confirmed.clone(), fresh])
        .unwrap();
    assert_eq!(
        responses[0].errors,
        vec![TransactionError::AlreadyConfirmed(confirmed.id)]
    );
    assert!(responses[1].is_ok());
}

#[test]
fn exempt_transactions_pass_validation() {
    let alice = keypair_from_passphrase("alice");
    let params = ChainParams::default();
    let odd = TransactionBuilder::transfer(Address(3), UNIT)
        .fee(1)
        .sign(&alice, &params.fees);
    let mut exceptions = NetworkExceptions::default();
    exceptions.transactions.insert(odd.id);

    let strict = ProcessTransactions::new(params.clone(), NetworkExceptions::default());
    assert_eq!(strict.validate_transactions(&[odd.clone()])[0].status, Status::Fail);
    let lenient = ProcessTransactions::new(params, exceptions);
    assert!(lenient.validate_transactions(&[odd])[0].is_ok());
}

#[test]
fn exempt_failing_transfer_applies_and_undoes_without_effect() {
    let store = NullStore::new();
    let alice = keypair_from_passphrase("alice");
    let bob = keypair_from_passphrase("bob");
    let alice_address = fund(&store, &alice, UNIT);
    let bob_address = fund(&store, &bob, 50 * UNIT);
    let params = ChainParams::default();
    let overdraft = TransactionBuilder::transfer(bob_address, 20 * UNIT).sign(&alice, &params.fees);
    let mut exceptions = NetworkExceptions::default();
    exceptions.transactions.insert(overdraft.id);
    let engine = ProcessTransactions::new(params, exceptions);
    let txs = vec![overdraft.clone()];
    let balances = |store: &NullStore| {
        (
            store.get_account(&alice_address).unwrap().unwrap().balance,
            store.get_account(&bob_address).unwrap().unwrap().balance,
        )
    };

    let ctx = ApplyContext::block(4);
    let (responses, state) = engine.apply_transactions(&store, &txs, &ctx).unwrap();
    assert!(responses[0].is_ok());
    assert_eq!(state.pending_transactions(), &[overdraft.id]);
    state.commit().unwrap();
    assert_eq!(balances(&store), (UNIT, 50 * UNIT));
    assert!(store.is_inert_transaction(&overdraft.id).unwrap());

    let (responses, state) = engine.undo_transactions(&store, &txs, &ctx).unwrap();
    assert!(responses[0].is_ok());
    assert!(state.pending_transactions().is_empty());
    state.commit().unwrap();
    assert_eq!(balances(&store), (UNIT, 50 * UNIT));
    assert!(!store.is_inert_transaction(&overdraft.id).unwrap());
}

#[test]
fn exempt_transaction_that_applies_is_undone_normally() {
    let store = NullStore::new();
    let alice = keypair_from_passphrase("alice");
    let alice_address = fund(&store, &alice, 10 * UNIT);
    let params = ChainParams::default();
    let transfer = TransactionBuilder::transfer(Address(5), UNIT).sign(&alice, &params.fees);
    let mut exceptions = NetworkExceptions::default();
    exceptions.transactions.insert(transfer.id);
    let engine = ProcessTransactions::new(params, exceptions);
    let txs = vec![transfer.clone()];

    let ctx = ApplyContext::block(4);
    let (_, state) = engine.apply_transactions(&store, &txs, &ctx).unwrap();
    state.commit().unwrap();
    assert!(!store.is_inert_transaction(&transfer.id).unwrap());
    assert!(store.get_account(&alice_address).unwrap().unwrap().balance < 9 * UNIT);

    let (_, state) = engine.undo_transactions(&store, &txs, &ctx).unwrap();
    state.commit().unwrap();
    assert_eq!(store.get_account(&alice_address).unwrap().unwrap().balance, 10 * UNIT);
    assert_eq!(store.get_account(&Address(5)).unwrap().unwrap().balance, 0);
}

#[test]
fn validation_preserves_order() {
    let engine = engine();
    let alice = keypair_from_passphrase("alice");
    let fees = &engine.params().fees;
    let txs: Vec<_> = (1..=20)
        .map(|n| TransactionBuilder::transfer(Address(n), n * 10).sign(&alice, fees))
        .collect();
    let responses = engine.validate_transactions(&txs);
    let ids: Vec<_> = responses.iter().map(|r| r.id).collect();
    let expected: Vec<_> = txs.iter().map(|tx| tx.id).collect();
    assert_eq!(ids, expected);
}

#[test]
fn cosignatures_become_ready_at_threshold() {
    let store = NullStore::new();
    let engine = engine();
    let owner = keypair_from_passphrase("owner");
    let m1 = keypair_from_passphrase("m1");
    let m2 = keypair_from_passphrase("m2");
    let owner_address = fund(&store, &owner, 100 * UNIT);
    let mut account = store.get_account(&owner_address).unwrap().unwrap();
    account.multisignatures = vec![m1.public, m2.public];
    account.u_multisignatures = account.multisignatures.clone();
    account.multimin = 2;
    account.u_multimin = 2;
    store.upsert_account(&account).unwrap();

    let tx = TransactionBuilder::transfer(Address(5), UNIT).sign(&owner, &engine.params().fees);
    let first = engine.process_signature(&store, &tx, tx.multisign(&m1)).unwrap();
    assert!(!first.ready);
    let duplicate = engine.process_signature(&store, &first.transaction, tx.multisign(&m1));
    assert!(matches!(duplicate, Err(LedgerError::Transaction { .. })));
    let second = engine
        .process_signature(&store, &first.transaction, tx.multisign(&m2))
        .unwrap();
    assert!(second.ready);
    assert_eq!(second.transaction.signatures.len(), 2);
    assert_eq!(second.transaction.id, tx.id);
}

#[test]
fn genesis_block_applies_cleanly() {
    let store = NullStore::new();
    let mut params = ChainParams::default();
    params.active_delegates = 5;
    let engine = ProcessTransactions::new(params.clone(), NetworkExceptions::default());
    let block = create_genesis_block(&GenesisConfig::dev(&params), &params);
    for response in engine.validate_transactions(&block.transactions) {
        // Genesis transactions carry no fee, so only the fee check may fail.
        assert!(
            response.is_ok()
                || matches!(response.errors[0], TransactionError::InvalidFee { .. })
        );
    }

    let mut state = StateStore::mutating(&store);
    let responses = engine
        .apply_transactions_in(&mut state, &block.transactions, &ApplyContext::genesis())
        .unwrap();
    assert!(responses.iter().all(|r| r.is_ok()));
    let totals = state.vote_totals(1).unwrap();
    assert_eq!(totals.len(), 5);
    assert!(totals.values().all(|v| *v == (params.total_supply / 5) as i64));
    state.commit().unwrap();
    assert!(store.get_account_by_username("genesis_3").unwrap().is_some());
}
