use kestrel_nullables::NullStore;
use kestrel_store::{
    Account, AccountStore, BatchOp, BlockRecord, BlockStore, DappRecord, PrepareRequest,
    RoundStore, StateMode, StateStore, StoreError, VoteDelta,
};
use kestrel_types::{Address, BlockId, PublicKey, Timestamp, TransactionId};

fn funded(store: &NullStore, address: u64, balance: u64) {
    let mut account = Account::new(Address(address));
    account.balance = balance;
    account.u_balance = balance;
    store.upsert_account(&account).unwrap();
}

fn delta(round: u64, delegate: u8, amount: i64) -> VoteDelta {
    VoteDelta {
        round,
        delegate: PublicKey([delegate; 32]),
        voter: Address(1),
        amount,
    }
}

fn record(height: u64) -> BlockRecord {
    BlockRecord {
        id: BlockId(1000 + height),
        height,
        previous_block_id: None,
        timestamp: Timestamp::new(0),
        generator_public_key: PublicKey([height as u8; 32]),
        number_of_transactions: 0,
        total_amount: 0,
        total_fee: 10,
        reward: 5,
    }
}

#[test]
fn unknown_accounts_are_created_lazily() {
    let store = NullStore::new();
    let mut state = StateStore::mutating(&store);
    let account = state.get_account(&Address(7)).unwrap();
    assert_eq!(account, Account::new(Address(7)));
    assert!(store.get_account(&Address(7)).unwrap().is_none());
}

#[test]
fn prepare_loads_existing_and_missing_accounts() {
    let store = NullStore::new();
    funded(&store, 1, 500);
    let mut state = StateStore::read_only(&store);
    state
        .prepare(&PrepareRequest {
            addresses: vec![Address(1), Address(2), Address(1)],
            ..PrepareRequest::default()
        })
        .unwrap();
    assert_eq!(state.get_account(&Address(1)).unwrap().balance, 500);
    assert_eq!(state.get_account(&Address(2)).unwrap().balance, 0);
}

#[test]
fn commit_writes_dirty_accounts_atomically() {
    let store = NullStore::new();
    funded(&store, 1, 500);
    let mut state = StateStore::mutating(&store);
    let mut account = state.get_account(&Address(1)).unwrap();
    account.balance = 400;
    state.set_account(account);
    state.commit().unwrap();
    assert_eq!(store.get_account(&Address(1)).unwrap().unwrap().balance, 400);
    assert_eq!(store.batches_written(), 1);
}

#[test]
fn read_only_store_refuses_commit() {
    let store = NullStore::new();
    let mut state = StateStore::new(&store, StateMode::ReadOnly);
    state.set_account(Account::new(Address(3)));
    assert!(matches!(state.commit(), Err(StoreError::ReadOnly)));
    assert!(store.get_account(&Address(3)).unwrap().is_none());
}

#[test]
fn failed_commit_leaves_backend_untouched() {
    let store = NullStore::new();
    funded(&store, 1, 500);
    store.fail_next_write();
    let mut state = StateStore::mutating(&store);
    let mut account = state.get_account(&Address(1)).unwrap();
    account.balance = 1;
    state.set_account(account);
    assert!(state.commit().is_err());
    assert_eq!(store.get_account(&Address(1)).unwrap().unwrap().balance, 500);
}

#[test]
fn restore_snapshot_rewinds_account_changes() {
    let store = NullStore::new();
    funded(&store, 1, 500);
    let mut state = StateStore::read_only(&store);
    state.create_snapshot();
    let mut account = state.get_account(&Address(1)).unwrap();
    account.balance = 0;
    state.set_account(account);
    state.add_transaction(TransactionId(9));
    state.add_vote_delta(delta(1, 1, -500));
    state.restore_snapshot().unwrap();

    assert_eq!(state.get_account(&Address(1)).unwrap().balance, 500);
    assert!(state.pending_transactions().is_empty());
    assert!(state.vote_deltas(1).unwrap().is_empty());
}

#[test]
fn snapshots_nest() {
    let store = NullStore::new();
    let mut state = StateStore::read_only(&store);
    state.create_snapshot();
    state.add_transaction(TransactionId(1));
    state.create_snapshot();
    state.add_transaction(TransactionId(2));
    state.restore_snapshot().unwrap();
    assert_eq!(state.pending_transactions(), &[TransactionId(1)]);
    state.restore_snapshot().unwrap();
    assert!(state.pending_transactions().is_empty());
    assert!(matches!(state.restore_snapshot(), Err(StoreError::NoSnapshot)));
}

#[test]
fn changed_accounts_report_their_earlier_state() {
    let store = NullStore::new();
    funded(&store, 1, 500);
    let mut state = StateStore::mutating(&store);
    let mark = state.journal_position();
    for balance in [400, 300] {
        let mut account = state.get_account(&Address(1)).unwrap();
        account.balance = balance;
        state.set_account(account);
    }
    let changed = state.accounts_changed_since(mark);
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].1.balance, 500);
}

#[test]
fn username_lookup_prefers_cached_view() {
    let store = NullStore::new();
    let mut account = Account::new(Address(4));
    account.username = Some("genesis_4".into());
    store.upsert_account(&account).unwrap();

    let mut state = StateStore::mutating(&store);
    assert!(state.account_by_username("genesis_4").unwrap().is_some());
    let mut cached = state.get_account(&Address(4)).unwrap();
    cached.username = None;
    state.set_account(cached);
    assert!(state.account_by_username("genesis_4").unwrap().is_none());
}

#[test]
fn vote_totals_merge_persisted_and_new_rows() {
    let store = NullStore::new();
    let mut seed = StateStore::mutating(&store);
    seed.add_vote_delta(delta(3, 1, 100));
    seed.commit().unwrap();

    let mut state = StateStore::mutating(&store);
    state.add_vote_delta(delta(3, 1, 50));
    state.add_vote_delta(delta(3, 2, -20));
    let totals = state.vote_totals(3).unwrap();
    assert_eq!(totals[&PublicKey([1; 32])], 150);
    assert_eq!(totals[&PublicKey([2; 32])], -20);
}

#[test]
fn flush_and_restore_round_replace_persisted_rows() {
    let store = NullStore::new();
    let mut seed = StateStore::mutating(&store);
    seed.add_vote_delta(delta(2, 1, 100));
    seed.commit().unwrap();

    let mut state = StateStore::mutating(&store);
    let rows = state.flush_round(2).unwrap();
    assert_eq!(rows.len(), 1);
    assert!(state.vote_totals(2).unwrap().is_empty());
    state.commit().unwrap();
    assert!(store.vote_deltas(2).unwrap().is_empty());

    let mut state = StateStore::mutating(&store);
    state.restore_round(2, rows).unwrap();
    state.commit().unwrap();
    assert_eq!(store.vote_deltas(2).unwrap(), vec![delta(2, 1, 100)]);
}

#[test]
fn round_archive_roundtrip_through_staging() {
    let store = NullStore::new();
    let mut state = StateStore::mutating(&store);
    state.stage_round_archive(101, vec![delta(1, 1, 5)]);
    state.commit().unwrap();
    assert!(store.round_archive(101).unwrap().is_some());

    let mut state = StateStore::mutating(&store);
    assert_eq!(state.take_round_archive(101).unwrap(), vec![delta(1, 1, 5)]);
    state.commit().unwrap();
    assert!(store.round_archive(101).unwrap().is_none());
}

#[test]
fn missing_round_archive_is_an_error() {
    let store = NullStore::new();
    let mut state = StateStore::mutating(&store);
    assert!(matches!(
        state.take_round_archive(5),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn staged_block_carries_applied_transactions() {
    let store = NullStore::new();
    let mut state = StateStore::mutating(&store);
    state.add_transaction(TransactionId(1));
    state.add_transaction(TransactionId(2));
    state.stage_block_append(record(1), b"block".to_vec());
    match &state.staged_operations()[0] {
        BatchOp::AppendBlock {
            transaction_ids, ..
        } => assert_eq!(transaction_ids, &vec![TransactionId(1), TransactionId(2)]),
        other => panic!("unexpected op {other:?}"),
    }
    state.commit().unwrap();
    assert!(store.block_at_height(1).unwrap().is_some());
}

#[test]
fn sum_round_sees_staged_blocks() {
    let store = NullStore::new();
    store.append_block(&record(1), b"", &[]).unwrap();
    let mut state = StateStore::mutating(&store);
    state.stage_block_append(record(2), Vec::new());
    let summary = state.sum_round(1, 3).unwrap();
    assert_eq!(summary.fees, 20);
    assert_eq!(summary.rewards, vec![5, 5]);
    assert_eq!(summary.delegates.len(), 2);
}

#[test]
fn dapp_name_lookup_respects_pending_removal() {
    let store = NullStore::new();
    let record = DappRecord {
        transaction_id: TransactionId(77),
        owner: Address(1),
        name: "ledger-app".into(),
        link: "https://example.org/app.zip".into(),
    };
    let mut seed = StateStore::mutating(&store);
    seed.put_dapp(record.clone());
    seed.commit().unwrap();

    let mut state = StateStore::mutating(&store);
    assert_eq!(state.dapp_by_name("ledger-app").unwrap(), Some(record));
    state.remove_dapp(&TransactionId(77));
    assert!(state.dapp_by_name("ledger-app").unwrap().is_none());
    assert!(state.dapp_by_link("https://example.org/app.zip").unwrap().is_none());
}
