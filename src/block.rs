use std::{fmt, sync::atomic::AtomicBool, time::SystemTime};

use log::info;
use serde::Serialize;

use crate::{errors::Result, proof_of_work::ProofOfWork, transaction::Transaction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    timestamp: u128, // time when the block was created, in milliseconds
    transactions: Vec<Transaction>,
    prev_block_hash: String,
    hash: String,
    height: u64,
    nonce: u64,
}

impl Block {
    pub fn get_transactions(&self) -> &Vec<Transaction> {
        &self.transactions
    }

    /// Builds a block on top of `prev_block_hash` and mines it.
    pub fn new_block(transactions: Vec<Transaction>, prev_block_hash: String, height: u64) -> Result<Block> {
        let mut block = Block::unsealed(transactions, prev_block_hash, height)?;
        let (nonce, hash) = ProofOfWork::new(&block).run()?;
        block.seal(nonce, hash);
        Ok(block)
    }

    /// Same as [`Block::new_block`], but the search stops when `cancel` is set.
    pub fn new_block_with_cancel(
        transactions: Vec<Transaction>,
        prev_block_hash: String,
        height: u64,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        let mut block = Block::unsealed(transactions, prev_block_hash, height)?;
        let (nonce, hash) = ProofOfWork::new(&block).run_with_cancel(cancel)?;
        block.seal(nonce, hash);
        Ok(block)
    }

    pub fn new_genesis_block(coinbase: Transaction) -> Result<Block> {
        Block::new_block(vec![coinbase], String::new(), 0)
    }

    /// Reassembles a block from its header fields, recomputing the hash.
    pub fn from_parts(
        timestamp: u128,
        transactions: Vec<Transaction>,
        prev_block_hash: String,
        height: u64,
        nonce: u64,
    ) -> Result<Block> {
        let mut block = Block {
            timestamp,
            transactions,
            prev_block_hash,
            hash: String::new(),
            height,
            nonce,
        };
        block.hash = hex::encode(ProofOfWork::new(&block).hash_with_nonce(nonce)?);
        Ok(block)
    }

    fn unsealed(transactions: Vec<Transaction>, prev_block_hash: String, height: u64) -> Result<Block> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_millis();
        info!("new block at height {} with {} transactions", height, transactions.len());
        Ok(Block {
            timestamp,
            transactions,
            prev_block_hash,
            hash: String::new(),
            height,
            nonce: 0,
        })
    }

    fn seal(&mut self, nonce: u64, hash: [u8; 32]) {
        self.nonce = nonce;
        self.hash = hex::encode(hash);
    }

    pub fn get_hash(&self) -> String {
        self.hash.clone()
    }

    pub fn get_prev_hash(&self) -> String {
        self.prev_block_hash.clone()
    }

    pub fn get_timestamp(&self) -> u128 {
        self.timestamp
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_block_hash.is_empty()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} Block {} {}", "#".repeat(25), self.height, "#".repeat(25))?;
        writeln!(f, "Prev. hash: {}", self.prev_block_hash)?;
        writeln!(f, "Hash: {}", self.hash)?;
        writeln!(f, "Timestamp: {}", self.timestamp)?;
        write!(f, "Nonce: {}", self.nonce)?;
        for tx in &self.transactions {
            write!(f, "\n{}", tx)?;
        }
        Ok(())
    }
}
