use std::time::SystemTimeError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("block or key not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("no existing blockchain found at {0}, create one first")]
    NoSuchChain(String),

    #[error("blockchain already exists at {0}")]
    AlreadyExists(String),

    #[error("not enough funds: needed {needed}, spendable {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("proof of work search aborted at nonce {0}")]
    ProofSearchAborted(u64),

    #[error("invalid amount: {0}")]
    InvalidAmount(u64),

    #[error("invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system clock error: {0}")]
    Clock(#[from] SystemTimeError),
}

impl From<bincode::Error> for ChainError {
    fn from(e: bincode::Error) -> Self {
        ChainError::CorruptRecord(e.to_string())
    }
}
