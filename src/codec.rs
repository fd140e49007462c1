//! Binary record format of a stored block.
//!
//! The record carries the header fields and the transactions in a fixed
//! bincode layout (little endian, fixed-width integers, no trailing bytes).
//! The block hash is not part of the record; [`decode`] recomputes it.

use bincode::Options;

use crate::{
    block::Block,
    errors::{ChainError, Result},
    transaction::Transaction,
};

type Record = (u128, Vec<Transaction>, String, u64, u64);

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

pub fn encode(block: &Block) -> Result<Vec<u8>> {
    let record = (
        block.get_timestamp(),
        block.get_transactions(),
        block.get_prev_hash(),
        block.get_height(),
        block.get_nonce(),
    );
    Ok(options().serialize(&record)?)
}

pub fn decode(bytes: &[u8]) -> Result<Block> {
    let (timestamp, transactions, prev_block_hash, height, nonce): Record = options()
        .deserialize(bytes)
        .map_err(|e| ChainError::CorruptRecord(format!("undecodable block: {}", e)))?;
    Block::from_parts(timestamp, transactions, prev_block_hash, height, nonce)
}
