//! Single-node proof-of-work ledger.
//!
//! Blocks live in a sled store keyed by hash, with a tip pointer to the
//! latest one. Balances are derived by walking the chain backward and
//! collecting the outputs no later input has consumed.

pub mod block;
pub mod blockchain;
pub mod codec;
pub mod constants;
pub mod errors;
pub mod proof_of_work;
pub mod storage;
pub mod transaction;
pub mod tx;
pub mod utxoset;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIter};
pub use errors::{ChainError, Result};
pub use transaction::Transaction;
pub use utxoset::{UTXOSet, UnspentOutput};
