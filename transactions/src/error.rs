use kestrel_store::StoreError;
use kestrel_types::{Address, PublicKey, TransactionId};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("invalid transaction id: expected {expected}, got {actual}")]
    InvalidId {
        expected: TransactionId,
        actual: TransactionId,
    },

    #[error("invalid transaction fee: expected {expected}, got {actual}")]
    InvalidFee { expected: u64, actual: u64 },

    #[error("invalid transaction amount: {0}")]
    InvalidAmount(String),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid asset: {0}")]
    InvalidAsset(String),

    #[error("failed to verify signature")]
    InvalidSignature,

    #[error("failed to verify second signature")]
    InvalidSecondSignature,

    #[error("missing second signature")]
    MissingSecondSignature,

    #[error("sender does not have a second signature")]
    UnexpectedSecondSignature,

    #[error("invalid multisignature: {0}")]
    InvalidMultisignature(String),

    #[error("sender public key {actual} does not match account key {expected}")]
    SenderPublicKeyMismatch {
        expected: PublicKey,
        actual: PublicKey,
    },

    #[error("account {address} does not have enough balance: needs {needed}, has {available}")]
    InsufficientBalance {
        address: Address,
        needed: u64,
        available: u64,
    },

    #[error("account has already registered a second signature")]
    AlreadySecondSignature,

    #[error("account is already a delegate")]
    AlreadyDelegate,

    #[error("username already exists: {0}")]
    UsernameTaken(String),

    #[error("delegate not found: {0}")]
    DelegateNotFound(PublicKey),

    #[error("already voted for delegate {0}")]
    AlreadyVoted(PublicKey),

    #[error("not voted for delegate {0}")]
    NotVoted(PublicKey),

    #[error("maximum number of {max} votes exceeded ({actual})")]
    TooManyVotes { max: usize, actual: usize },

    #[error("account is already a multisignature account")]
    AlreadyMultisignature,

    #[error("application not found: {0}")]
    DappNotFound(TransactionId),

    #[error("application name already exists: {0}")]
    DappNameTaken(String),

    #[error("application link already exists: {0}")]
    DappLinkTaken(String),

    #[error("sender is not the owner of application {0}")]
    NotDappOwner(TransactionId),

    #[error("transaction {0} has already been transferred out")]
    OutTransferProcessed(TransactionId),

    #[error("transaction timestamp is in the future")]
    TimestampInFuture,

    #[error("transaction {0} is already confirmed")]
    AlreadyConfirmed(TransactionId),

    #[error("balance underflow while reverting account {0}")]
    UndoUnderflow(Address),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for TransactionError {
    fn from(err: StoreError) -> Self {
        Self::Storage(err.to_string())
    }
}
