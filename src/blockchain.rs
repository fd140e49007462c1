use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::atomic::AtomicBool,
};

use log::{debug, info, warn};

use crate::{
    block::Block,
    constants::{GENESIS_COINBASE_DATA, SUBSIDY},
    errors::{ChainError, Result},
    proof_of_work::ProofOfWork,
    storage::BlockStore,
    transaction::Transaction,
    tx::TXOutput,
    utxoset::UTXOSet,
};

/// Handle on a persistent chain: the tip hash and the store owning the blocks.
///
/// Appending takes `&mut self`; readers may clone the handle and scan in
/// parallel, each scan starting from the tip the clone saw.
#[derive(Debug, Clone)]
pub struct Blockchain {
    tip: String,
    store: BlockStore,
}

pub struct BlockchainIter<'a> {
    current_hash: Option<String>,
    store: &'a BlockStore,
}

impl Blockchain {
    /// Opens the chain stored at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Blockchain> {
        let path = path.as_ref();
        info!("opening chain at {}", path.display());
        let store = BlockStore::open(path)?;
        let tip = store
            .tip()?
            .ok_or_else(|| ChainError::NoSuchChain(path.display().to_string()))?;
        debug!("tip of {} is {}", path.display(), tip);
        Ok(Blockchain { tip, store })
    }

    /// Creates a new chain at `path` whose genesis block pays `address`.
    pub fn create_blockchain(path: impl AsRef<Path>, address: &str) -> Result<Blockchain> {
        info!("Creating new blockchain");
        let cbtx = Transaction::new_coinbase(address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::new_genesis_block(cbtx)?;
        let store = BlockStore::initialize(path, &genesis)?;
        Ok(Blockchain {
            tip: genesis.get_hash(),
            store,
        })
    }

    pub fn tip(&self) -> &str {
        &self.tip
    }

    pub fn get_block(&self, hash: &str) -> Result<Block> {
        self.store.get_block(hash)
    }

    /// Mines a block holding `transactions` on top of the stored tip and
    /// appends it. Nothing is written if verification or mining fails.
    pub fn mine_block(&mut self, transactions: Vec<Transaction>) -> Result<Block> {
        let (prev_hash, height) = self.prepare_append(&transactions)?;
        let block = Block::new_block(transactions, prev_hash, height)?;
        self.append(block)
    }

    /// Same as [`Blockchain::mine_block`], but the proof of work search gives
    /// up with `ProofSearchAborted` once `cancel` is set.
    pub fn mine_block_with_cancel(&mut self, transactions: Vec<Transaction>, cancel: &AtomicBool) -> Result<Block> {
        let (prev_hash, height) = self.prepare_append(&transactions)?;
        let block = Block::new_block_with_cancel(transactions, prev_hash, height, cancel)?;
        self.append(block)
    }

    fn prepare_append(&mut self, transactions: &[Transaction]) -> Result<(String, u64)> {
        let lasthash = self
            .store
            .tip()?
            .ok_or_else(|| ChainError::NotFound("tip".to_string()))?;
        if lasthash != self.tip {
            debug!("tip moved from {} to {} since open", self.tip, lasthash);
            self.tip = lasthash.clone();
        }
        let last = self.store.get_block(&lasthash)?;
        self.verify_transactions(transactions)?;
        Ok((lasthash, last.get_height() + 1))
    }

    fn append(&mut self, block: Block) -> Result<Block> {
        self.store.put_block(&block)?;
        self.tip = block.get_hash();
        info!("appended block {} at height {}", block.get_hash(), block.get_height());
        Ok(block)
    }

    /// Walks from the current tip back to genesis, inclusive.
    pub fn iter(&self) -> BlockchainIter<'_> {
        BlockchainIter {
            current_hash: Some(self.tip.clone()),
            store: &self.store,
        }
    }

    pub fn find_transaction(&self, id: &str) -> Result<Transaction> {
        for block in self.iter() {
            for tx in block?.get_transactions() {
                if tx.id == id {
                    return Ok(tx.clone());
                }
            }
        }
        Err(ChainError::NotFound(format!("transaction {}", id)))
    }

    /// Checks `tx` could be mined on top of the current tip.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<()> {
        self.verify_transactions(std::slice::from_ref(tx))
    }

    /// Checks a candidate block body against the chain. Inputs must name
    /// outputs already on chain and unspent, locked to the input's
    /// `script_sig` (a plain string comparison). No output may be claimed
    /// twice, inputs must cover outputs, and a coinbase mints exactly the
    /// subsidy.
    fn verify_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        let unspent = UTXOSet::new(self).unspent_index()?;
        let mut known_ids = HashSet::new();
        for block in self.iter() {
            for tx in block?.get_transactions() {
                known_ids.insert(tx.id.clone());
            }
        }

        let mut claimed = HashSet::new();
        for tx in transactions {
            let invalid = |reason: String| ChainError::InvalidTransaction {
                id: tx.id.clone(),
                reason,
            };
            if tx.hash()? != tx.id {
                return Err(invalid("id does not match content".to_string()));
            }
            if !known_ids.insert(tx.id.clone()) {
                return Err(invalid("duplicate transaction id".to_string()));
            }
            let output_total = tx
                .vout
                .iter()
                .try_fold(0u64, |acc, out| acc.checked_add(out.value))
                .ok_or_else(|| invalid("output values overflow".to_string()))?;

            if tx.is_coinbase() {
                if output_total != SUBSIDY {
                    return Err(invalid(format!("coinbase mints {} instead of {}", output_total, SUBSIDY)));
                }
            } else {
                verify_inputs(tx, output_total, &unspent, &mut claimed)?;
            }
        }
        Ok(())
    }

    /// Walks the whole chain checking proof of work, heights and links.
    /// Returns the number of blocks checked.
    pub fn validate_chain(&self) -> Result<u64> {
        let mut checked = 0;
        let mut expected_prev: Option<(String, u64)> = None;
        for block in self.iter() {
            let block = block?;
            if let Some((prev_hash, child_height)) = &expected_prev {
                if block.get_hash() != *prev_hash || block.get_height() + 1 != *child_height {
                    return Err(ChainError::CorruptRecord(format!(
                        "block {} does not link to its child",
                        block.get_hash()
                    )));
                }
            }
            if !ProofOfWork::new(&block).validate()? {
                warn!("block {} fails proof of work", block.get_hash());
                return Err(ChainError::CorruptRecord(format!(
                    "block {} fails proof of work",
                    block.get_hash()
                )));
            }
            if block.is_genesis() && block.get_height() != 0 {
                return Err(ChainError::CorruptRecord(format!(
                    "genesis block {} at height {}",
                    block.get_hash(),
                    block.get_height()
                )));
            }
            expected_prev = Some((block.get_prev_hash(), block.get_height()));
            checked += 1;
        }
        Ok(checked)
    }

    /// Flushes and releases the store.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

fn verify_inputs(
    tx: &Transaction,
    output_total: u64,
    unspent: &HashMap<(String, i32), TXOutput>,
    claimed: &mut HashSet<(String, i32)>,
) -> Result<()> {
    let invalid = |reason: String| ChainError::InvalidTransaction {
        id: tx.id.clone(),
        reason,
    };
    if tx.vin.is_empty() {
        return Err(invalid("no inputs".to_string()));
    }

    let mut input_total: u64 = 0;
    for vin in &tx.vin {
        let outpoint = (vin.txid.clone(), vin.vout);
        let prev = unspent
            .get(&outpoint)
            .ok_or_else(|| invalid(format!("output {}:{} is not spendable", vin.txid, vin.vout)))?;
        if !claimed.insert(outpoint) {
            return Err(invalid(format!("output {}:{} claimed twice", vin.txid, vin.vout)));
        }
        if !vin.can_unlock_output_with(&prev.script_pub_key) {
            return Err(invalid(format!("{} does not own {}:{}", vin.script_sig, vin.txid, vin.vout)));
        }
        input_total = input_total
            .checked_add(prev.value)
            .ok_or_else(|| invalid("input values overflow".to_string()))?;
    }
    if input_total < output_total {
        return Err(invalid(format!("spends {} but inputs only hold {}", output_total, input_total)));
    }
    Ok(())
}

impl<'a> Iterator for BlockchainIter<'a> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        match self.store.get_block(&hash) {
            Ok(block) => {
                if !block.is_genesis() {
                    self.current_hash = Some(block.get_prev_hash());
                }
                Some(Ok(block))
            }
            Err(e) => Some(Err(e)),
        }
    }
}
