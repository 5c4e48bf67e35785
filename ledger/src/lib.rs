//! Blocks and the transaction engine.
//!
//! - [`block`]: block model, canonical encoding, payload and loading helpers
//! - [`genesis`]: the height-1 block that funds and registers the first delegates
//! - [`process`]: validate, apply, undo and dry-run batches of transactions
//! - [`round_information`]: vote deltas derived from account changes

pub mod block;
pub mod error;
pub mod genesis;
pub mod process;
pub mod round_information;

pub use block::{
    load_block, load_block_at_height, load_blocks_range, load_last_block, sort_transactions,
    Block, BlockTemplate, Payload,
};
pub use error::LedgerError;
pub use genesis::{create_genesis_block, GenesisConfig, GenesisDelegate};
pub use process::{ApplyContext, ProcessTransactions, SignatureOutcome, VerifyContext};
pub use round_information::record_vote_deltas;
