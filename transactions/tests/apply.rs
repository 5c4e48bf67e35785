use kestrel_crypto::{derive_address, keypair_from_passphrase};
use kestrel_nullables::NullStore;
use kestrel_store::{Account, AccountStore, StateStore};
use kestrel_transactions::{
    ApplyEnv, DappAsset, DappCategory, Status, TransactionBuilder, TransactionError, VoteChange,
};
use kestrel_types::{Address, ChainParams, KeyPair, TransactionId, UNIT};

fn params() -> ChainParams {
    ChainParams::default()
}

fn fund(store: &NullStore, keypair: &KeyPair, balance: u64) -> Address {
    let address = derive_address(&keypair.public);
    let mut account = Account::new(address);
    account.balance = balance;
    account.u_balance = balance;
    store.upsert_account(&account).unwrap();
    address
}

#[test]
fn transfer_moves_amount_and_fee() {
    let store = NullStore::new();
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let alice_address = fund(&store, &alice, 10 * UNIT);
    let tx = TransactionBuilder::transfer(Address(42), 3 * UNIT).sign(&alice, &params.fees);
    tx.validate(&params).unwrap();

    let mut state = StateStore::mutating(&store);
    let response = tx.apply(&mut state, &ApplyEnv::new(&params, 2));
    assert_eq!(response.status, Status::Ok);

    let sender = state.get_account(&alice_address).unwrap();
    assert_eq!(sender.balance, 10 * UNIT - 3 * UNIT - params.fees.transfer);
    assert_eq!(sender.u_balance, sender.balance);
    assert_eq!(sender.public_key, Some(alice.public));
    assert_eq!(state.get_account(&Address(42)).unwrap().balance, 3 * UNIT);
}

#[test]
fn undo_restores_both_accounts() {
    let store = NullStore::new();
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let alice_address = fund(&store, &alice, 10 * UNIT);
    let tx = TransactionBuilder::transfer(Address(42), UNIT).sign(&alice, &params.fees);

    let mut state = StateStore::mutating(&store);
    let env = ApplyEnv::new(&params, 2);
    assert!(tx.apply(&mut state, &env).is_ok());
    tx.undo(&mut state, &env).unwrap();
    assert_eq!(state.get_account(&alice_address).unwrap().balance, 10 * UNIT);
    assert_eq!(state.get_account(&Address(42)).unwrap().balance, 0);
}

#[test]
fn insufficient_balance_fails_without_side_effects() {
    let store = NullStore::new();
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let alice_address = fund(&store, &alice, UNIT);
    let tx = TransactionBuilder::transfer(Address(42), UNIT).sign(&alice, &params.fees);

    let mut state = StateStore::mutating(&store);
    let response = tx.apply(&mut state, &ApplyEnv::new(&params, 2));
    assert_eq!(response.status, Status::Fail);
    assert!(matches!(
        response.errors[0],
        TransactionError::InsufficientBalance { .. }
    ));
    let sender = state.get_account(&alice_address).unwrap();
    assert_eq!(sender.balance, UNIT);
    assert_eq!(sender.public_key, None);
}

#[test]
fn self_transfer_only_costs_the_fee() {
    let store = NullStore::new();
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let alice_address = fund(&store, &alice, 5 * UNIT);
    let tx = TransactionBuilder::transfer(alice_address, UNIT).sign(&alice, &params.fees);

    let mut state = StateStore::mutating(&store);
    assert!(tx.apply(&mut state, &ApplyEnv::new(&params, 2)).is_ok());
    assert_eq!(
        state.get_account(&alice_address).unwrap().balance,
        5 * UNIT - params.fees.transfer
    );
}

#[test]
fn genesis_transfers_mint() {
    let store = NullStore::new();
    let params = params();
    let genesis = keypair_from_passphrase("genesis");
    let tx = TransactionBuilder::transfer(Address(7), 1_000 * UNIT)
        .fee(0)
        .sign(&genesis, &params.fees);

    let mut state = StateStore::mutating(&store);
    assert!(tx.apply(&mut state, &ApplyEnv::genesis(&params)).is_ok());
    assert_eq!(state.get_account(&Address(7)).unwrap().balance, 1_000 * UNIT);
    assert_eq!(
        state
            .get_account(&derive_address(&genesis.public))
            .unwrap()
            .balance,
        0
    );
}

#[test]
fn tampered_transactions_fail_validation() {
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let tx = TransactionBuilder::transfer(Address(1), UNIT).sign(&alice, &params.fees);

    let mut wrong_fee = TransactionBuilder::transfer(Address(1), UNIT)
        .fee(1)
        .sign(&alice, &params.fees);
    assert!(matches!(
        wrong_fee.validate(&params),
        Err(TransactionError::InvalidFee { .. })
    ));
    wrong_fee.id = TransactionId(1);
    assert!(matches!(
        wrong_fee.validate(&params),
        Err(TransactionError::InvalidId { .. })
    ));

    let mut forged = tx.clone();
    forged.amount += 1;
    forged.id = forged.compute_id();
    assert_eq!(forged.validate(&params), Err(TransactionError::InvalidSignature));
}

#[test]
fn second_signature_is_required_once_registered() {
    let store = NullStore::new();
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let second = keypair_from_passphrase("alice second");
    fund(&store, &alice, 100 * UNIT);
    let env = ApplyEnv::new(&params, 2);

    let mut state = StateStore::mutating(&store);
    let register = TransactionBuilder::second_signature(second.public).sign(&alice, &params.fees);
    register.validate(&params).unwrap();
    assert!(register.apply(&mut state, &env).is_ok());

    let unsigned = TransactionBuilder::transfer(Address(1), UNIT).sign(&alice, &params.fees);
    let response = unsigned.apply(&mut state, &env);
    assert_eq!(response.errors, vec![TransactionError::MissingSecondSignature]);

    let wrong = TransactionBuilder::transfer(Address(1), UNIT).sign_with_second(
        &alice,
        &keypair_from_passphrase("not it"),
        &params.fees,
    );
    let response = wrong.apply(&mut state, &env);
    assert_eq!(response.errors, vec![TransactionError::InvalidSecondSignature]);

    let signed = TransactionBuilder::transfer(Address(1), UNIT).sign_with_second(&alice, &second, &params.fees);
    assert!(signed.apply(&mut state, &env).is_ok());

    let again = TransactionBuilder::second_signature(second.public)
        .timestamp(kestrel_types::Timestamp::new(1))
        .sign_with_second(&alice, &second, &params.fees);
    assert_eq!(
        again.apply(&mut state, &env).errors,
        vec![TransactionError::AlreadySecondSignature]
    );
}

#[test]
fn usernames_are_unique() {
    let store = NullStore::new();
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let bob = keypair_from_passphrase("bob");
    fund(&store, &alice, 100 * UNIT);
    fund(&store, &bob, 100 * UNIT);
    let env = ApplyEnv::new(&params, 2);

    let mut state = StateStore::mutating(&store);
    let first = TransactionBuilder::delegate("falcon").sign(&alice, &params.fees);
    assert!(first.apply(&mut state, &env).is_ok());
    let second = TransactionBuilder::delegate("falcon").sign(&bob, &params.fees);
    assert_eq!(
        second.apply(&mut state, &env).errors,
        vec![TransactionError::UsernameTaken("falcon".into())]
    );
    let repeat = TransactionBuilder::delegate("hawk").sign(&alice, &params.fees);
    assert_eq!(
        repeat.apply(&mut state, &env).errors,
        vec![TransactionError::AlreadyDelegate]
    );

    first.undo(&mut state, &env).unwrap();
    assert!(state.account_by_username("falcon").unwrap().is_none());
}

#[test]
fn votes_require_registered_delegates() {
    let store = NullStore::new();
    let params = params();
    let voter = keypair_from_passphrase("voter");
    let delegate = keypair_from_passphrase("delegate");
    let voter_address = fund(&store, &voter, 100 * UNIT);
    fund(&store, &delegate, 100 * UNIT);
    let env = ApplyEnv::new(&params, 2);
    let mut state = StateStore::mutating(&store);

    let early = TransactionBuilder::vote(vec![VoteChange::add(delegate.public)]).sign(&voter, &params.fees);
    early.validate(&params).unwrap();
    assert_eq!(
        early.apply(&mut state, &env).errors,
        vec![TransactionError::DelegateNotFound(delegate.public)]
    );

    let register = TransactionBuilder::delegate("kite").sign(&delegate, &params.fees);
    assert!(register.apply(&mut state, &env).is_ok());
    assert!(early.apply(&mut state, &env).is_ok());
    assert_eq!(
        state.get_account(&voter_address).unwrap().voted_delegates,
        vec![delegate.public]
    );

    let twice = TransactionBuilder::vote(vec![VoteChange::add(delegate.public)])
        .timestamp(kestrel_types::Timestamp::new(5))
        .sign(&voter, &params.fees);
    assert_eq!(
        twice.apply(&mut state, &env).errors,
        vec![TransactionError::AlreadyVoted(delegate.public)]
    );

    let unvote = TransactionBuilder::vote(vec![VoteChange::remove(delegate.public)]).sign(&voter, &params.fees);
    assert!(unvote.apply(&mut state, &env).is_ok());
    assert!(state.get_account(&voter_address).unwrap().voted_delegates.is_empty());
    unvote.undo(&mut state, &env).unwrap();
    assert_eq!(
        state.get_account(&voter_address).unwrap().voted_delegates,
        vec![delegate.public]
    );
}

#[test]
fn vote_must_be_addressed_to_sender() {
    let params = params();
    let voter = keypair_from_passphrase("voter");
    let mut tx = TransactionBuilder::vote(vec![VoteChange::add(voter.public)]).sign(&voter, &params.fees);
    tx.recipient_id = Some(Address(1));
    tx.sign(&voter);
    assert!(matches!(
        tx.validate(&params),
        Err(TransactionError::InvalidRecipient(_))
    ));
}

#[test]
fn multisignature_registration_waits_for_every_member() {
    let store = NullStore::new();
    let params = params();
    let owner = keypair_from_passphrase("owner");
    let m1 = keypair_from_passphrase("member one");
    let m2 = keypair_from_passphrase("member two");
    let owner_address = fund(&store, &owner, 100 * UNIT);
    let env = ApplyEnv::new(&params, 2);

    let mut tx = TransactionBuilder::multisignature(2, 24, vec![m1.public, m2.public]).sign(&owner, &params.fees);
    tx.validate(&params).unwrap();
    assert_eq!(tx.fee, params.fees.multisignature_fee(2));

    let mut state = StateStore::mutating(&store);
    assert_eq!(tx.apply(&mut state, &env).status, Status::Pending);
    assert!(!state.get_account(&owner_address).unwrap().is_multisignature());

    let sig1 = tx.multisign(&m1);
    tx.signatures.push(sig1);
    assert_eq!(tx.apply(&mut state, &env).status, Status::Pending);
    let sig2 = tx.multisign(&m2);
    let owner_account = state.get_account(&owner_address).unwrap();
    assert!(tx.accepts_cosignature(&owner_account, &sig2));
    assert!(!tx.accepts_cosignature(&owner_account, &sig1));
    tx.signatures.push(sig2);
    assert_eq!(tx.apply(&mut state, &env).status, Status::Ok);

    let account = state.get_account(&owner_address).unwrap();
    assert_eq!(account.multisignatures, vec![m1.public, m2.public]);
    assert_eq!(account.multimin, 2);

    // Later transactions need `min` co-signatures.
    let mut spend = TransactionBuilder::transfer(Address(1), UNIT).sign(&owner, &params.fees);
    assert_eq!(spend.signatures_required(&account), 2);
    let sig = spend.multisign(&m1);
    spend.signatures.push(sig);
    assert_eq!(spend.apply(&mut state, &env).status, Status::Pending);
    let sig = spend.multisign(&m2);
    spend.signatures.push(sig);
    assert_eq!(spend.apply(&mut state, &env).status, Status::Ok);
}

#[test]
fn foreign_cosignature_is_rejected() {
    let store = NullStore::new();
    let params = params();
    let owner = keypair_from_passphrase("owner");
    let m1 = keypair_from_passphrase("member one");
    fund(&store, &owner, 100 * UNIT);

    let mut tx = TransactionBuilder::multisignature(1, 1, vec![m1.public]).sign(&owner, &params.fees);
    let foreign = tx.multisign(&keypair_from_passphrase("stranger"));
    tx.signatures.push(foreign);
    let mut state = StateStore::mutating(&store);
    let response = tx.apply(&mut state, &ApplyEnv::new(&params, 2));
    assert!(matches!(
        response.errors[0],
        TransactionError::InvalidMultisignature(_)
    ));
}

#[test]
fn multisignature_asset_bounds() {
    let params = params();
    let owner = keypair_from_passphrase("owner");
    let m1 = keypair_from_passphrase("m1");
    let too_high = TransactionBuilder::multisignature(2, 24, vec![m1.public]).sign(&owner, &params.fees);
    assert!(too_high.validate(&params).is_err());
    let self_member = TransactionBuilder::multisignature(1, 24, vec![owner.public]).sign(&owner, &params.fees);
    assert!(self_member.validate(&params).is_err());
    let long_life = TransactionBuilder::multisignature(1, 73, vec![m1.public]).sign(&owner, &params.fees);
    assert!(long_life.validate(&params).is_err());
}

fn sample_dapp(name: &str) -> DappAsset {
    DappAsset {
        category: DappCategory::Utilities,
        name: name.into(),
        description: Some("side chain".into()),
        tags: Some("tools,chain".into()),
        dapp_type: 0,
        link: format!("https://example.org/{name}.zip"),
        icon: None,
    }
}

#[test]
fn dapp_lifecycle_with_transfers() {
    let store = NullStore::new();
    let params = params();
    let owner = keypair_from_passphrase("owner");
    let user = keypair_from_passphrase("user");
    let owner_address = fund(&store, &owner, 100 * UNIT);
    fund(&store, &user, 100 * UNIT);
    let env = ApplyEnv::new(&params, 2);
    let mut state = StateStore::mutating(&store);

    let register = TransactionBuilder::dapp(sample_dapp("ledger")).sign(&owner, &params.fees);
    register.validate(&params).unwrap();
    assert!(register.apply(&mut state, &env).is_ok());

    let clash = TransactionBuilder::dapp(sample_dapp("ledger")).sign(&user, &params.fees);
    assert_eq!(
        clash.apply(&mut state, &env).errors,
        vec![TransactionError::DappNameTaken("ledger".into())]
    );

    let deposit = TransactionBuilder::in_transfer(register.id, 10 * UNIT).sign(&user, &params.fees);
    assert!(deposit.apply(&mut state, &env).is_ok());
    let owner_balance = state.get_account(&owner_address).unwrap().balance;
    assert_eq!(owner_balance, 100 * UNIT - params.fees.dapp + 10 * UNIT);

    let payout = TransactionBuilder::out_transfer(register.id, deposit.id, Address(99), 2 * UNIT)
        .sign(&owner, &params.fees);
    assert!(payout.apply(&mut state, &env).is_ok());
    assert_eq!(state.get_account(&Address(99)).unwrap().balance, 2 * UNIT);

    let replay = TransactionBuilder::out_transfer(register.id, deposit.id, Address(99), 2 * UNIT)
        .timestamp(kestrel_types::Timestamp::new(3))
        .sign(&owner, &params.fees);
    assert_eq!(
        replay.apply(&mut state, &env).errors,
        vec![TransactionError::OutTransferProcessed(deposit.id)]
    );

    let stranger = TransactionBuilder::out_transfer(register.id, TransactionId(5), Address(99), UNIT)
        .sign(&user, &params.fees);
    assert_eq!(
        stranger.apply(&mut state, &env).errors,
        vec![TransactionError::NotDappOwner(register.id)]
    );

    payout.undo(&mut state, &env).unwrap();
    assert!(!state.out_transfer_exists(&deposit.id).unwrap());
}

#[test]
fn dapp_links_must_point_at_archives() {
    let params = params();
    let owner = keypair_from_passphrase("owner");
    let mut asset = sample_dapp("bad");
    asset.link = "ftp://example.org/bad.tar".into();
    let tx = TransactionBuilder::dapp(asset).sign(&owner, &params.fees);
    assert!(matches!(
        tx.validate(&params),
        Err(TransactionError::InvalidAsset(_))
    ));
}

#[test]
fn transaction_serializes_to_json() {
    let params = params();
    let alice = keypair_from_passphrase("alice");
    let tx = TransactionBuilder::transfer_with_data(Address(1), UNIT, "invoice 7").sign(&alice, &params.fees);
    let json = serde_json::to_string(&tx).unwrap();
    let back: kestrel_transactions::Transaction = serde_json::from_str(&json).unwrap();
    assert_eq!(back, tx);
    back.validate(&params).unwrap();
}
