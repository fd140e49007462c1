//! Hashcash-style admission rule for blocks.
//!
//! A block is admitted when `SHA256(header || nonce)`, read as a big-endian
//! 256-bit integer, is below `2^(256 - TARGET_BITS)`. The header covers the
//! previous hash, the merkle root of the transaction ids, the timestamp, the
//! height and the difficulty itself.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};
use merkle_cbt::merkle_tree::{Merge, CBMT};
use sha2::{Digest, Sha256};

use crate::{
    block::Block,
    constants::TARGET_BITS,
    errors::{ChainError, Result},
    transaction::Transaction,
};

pub type Hash256 = [u8; 32];

struct MergeSha256;

impl Merge for MergeSha256 {
    type Item = Hash256;

    fn merge(left: &Self::Item, right: &Self::Item) -> Self::Item {
        let mut hasher = Sha256::new();
        hasher.update(left);
        hasher.update(right);
        hasher.finalize().into()
    }
}

/// Merkle root over the transaction ids, in block order.
pub fn hash_transactions(transactions: &[Transaction]) -> Hash256 {
    let leaves: Vec<Hash256> = transactions
        .iter()
        .map(|tx| -> Hash256 { Sha256::digest(tx.id.as_bytes()).into() })
        .collect();
    CBMT::<Hash256, MergeSha256>::build_merkle_root(&leaves)
}

/// `2^(256 - bits)` as a big-endian array, `None` when it does not fit
/// (zero bits, every hash qualifies).
pub fn target(bits: u32) -> Option<Hash256> {
    if bits == 0 {
        return None;
    }
    let shift = 256 - bits.min(256) as usize;
    let mut target = [0u8; 32];
    target[31 - shift / 8] = 1 << (shift % 8);
    Some(target)
}

pub fn meets_target(hash: &Hash256, bits: u32) -> bool {
    match target(bits) {
        Some(target) => hash < &target,
        None => true,
    }
}

pub struct ProofOfWork<'a> {
    block: &'a Block,
    tx_digest: Hash256,
    target_bits: u32,
}

impl<'a> ProofOfWork<'a> {
    pub fn new(block: &'a Block) -> Self {
        ProofOfWork {
            block,
            tx_digest: hash_transactions(block.get_transactions()),
            target_bits: TARGET_BITS,
        }
    }

    fn prepare_data(&self, nonce: u64) -> Result<Vec<u8>> {
        let content = (
            self.block.get_prev_hash(),
            self.tx_digest,
            self.block.get_timestamp(),
            self.block.get_height(),
            self.target_bits,
            nonce,
        );
        Ok(bincode::serialize(&content)?)
    }

    pub fn hash_with_nonce(&self, nonce: u64) -> Result<Hash256> {
        let data = self.prepare_data(nonce)?;
        Ok(Sha256::digest(&data).into())
    }

    /// Searches nonces from zero until one meets the target. Unbounded.
    pub fn run(&self) -> Result<(u64, Hash256)> {
        self.search(None)
    }

    /// Like [`ProofOfWork::run`], but gives up with `ProofSearchAborted` as
    /// soon as `cancel` is raised.
    pub fn run_with_cancel(&self, cancel: &AtomicBool) -> Result<(u64, Hash256)> {
        self.search(Some(cancel))
    }

    fn search(&self, cancel: Option<&AtomicBool>) -> Result<(u64, Hash256)> {
        info!("Mining the block at height {}", self.block.get_height());
        let mut nonce: u64 = 0;
        loop {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    info!("Mining aborted after {} attempts", nonce);
                    return Err(ChainError::ProofSearchAborted(nonce));
                }
            }
            let hash = self.hash_with_nonce(nonce)?;
            if meets_target(&hash, self.target_bits) {
                debug!("found nonce {} -> {}", nonce, hex::encode(hash));
                return Ok((nonce, hash));
            }
            nonce = match nonce.checked_add(1) {
                Some(n) => n,
                None => return Err(ChainError::ProofSearchAborted(nonce)),
            };
        }
    }

    /// Recomputes the hash from the block's own header and nonce.
    pub fn validate(&self) -> Result<bool> {
        let hash = self.hash_with_nonce(self.block.get_nonce())?;
        Ok(meets_target(&hash, self.target_bits))
    }
}
