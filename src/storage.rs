//! Durable block store on top of sled.
//!
//! One tree maps block hash -> encoded block, plus the reserved [`TIP_KEY`]
//! entry holding the hash of the latest block. A block and the tip that
//! points at it are always written in the same sled transaction.

use std::path::Path;

use log::{debug, info, warn};
use sled::transaction::{TransactionError, TransactionResult};

use crate::{
    block::Block,
    codec,
    constants::{BLOCKS_TREE, TIP_KEY},
    errors::{ChainError, Result},
};

/// File sled writes at the root of every database directory.
const STORE_MARKER: &str = "conf";

#[derive(Debug, Clone)]
pub struct BlockStore {
    db: sled::Db,
    blocks: sled::Tree,
}

/// What currently occupies a store path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    Missing,
    EmptyDir,
    Store,
    Other,
}

fn inspect(path: &Path) -> Result<Occupant> {
    if !path.exists() {
        return Ok(Occupant::Missing);
    }
    if !path.is_dir() {
        return Ok(Occupant::Other);
    }
    if path.join(STORE_MARKER).is_file() {
        return Ok(Occupant::Store);
    }
    if std::fs::read_dir(path)?.next().is_none() {
        return Ok(Occupant::EmptyDir);
    }
    Ok(Occupant::Other)
}

impl BlockStore {
    /// Opens an existing store, `NoSuchChain` if no sled database lives at
    /// `path`. Never creates anything on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<BlockStore> {
        let path = path.as_ref();
        if inspect(path)? != Occupant::Store {
            return Err(ChainError::NoSuchChain(path.display().to_string()));
        }
        info!("open block store at {}", path.display());
        BlockStore::open_db(path)
    }

    /// Creates a store at a missing path or an empty directory. A database
    /// left without a tip is reused; anything else is `AlreadyExists`.
    pub fn create(path: impl AsRef<Path>) -> Result<BlockStore> {
        let path = path.as_ref();
        match inspect(path)? {
            Occupant::Missing | Occupant::EmptyDir => {
                info!("create block store at {}", path.display());
                BlockStore::open_db(path)
            }
            Occupant::Store => {
                let store = BlockStore::open_db(path)?;
                if store.tip()?.is_some() {
                    return Err(ChainError::AlreadyExists(path.display().to_string()));
                }
                warn!("reusing block store without tip at {}", path.display());
                Ok(store)
            }
            Occupant::Other => Err(ChainError::AlreadyExists(path.display().to_string())),
        }
    }

    /// Creates a store holding `genesis` as its only block. If the genesis
    /// write fails the store is removed again, leaving an empty directory
    /// only where one was found.
    pub fn initialize(path: impl AsRef<Path>, genesis: &Block) -> Result<BlockStore> {
        let path = path.as_ref();
        let occupant = inspect(path)?;
        let store = BlockStore::create(path)?;
        if let Err(e) = store.put_block(genesis) {
            drop(store);
            warn!("genesis write failed at {}, removing store: {}", path.display(), e);
            std::fs::remove_dir_all(path)?;
            if occupant == Occupant::EmptyDir {
                std::fs::create_dir(path)?;
            }
            return Err(e);
        }
        Ok(store)
    }

    fn open_db(path: &Path) -> Result<BlockStore> {
        let db = sled::open(path)?;
        let blocks = db.open_tree(BLOCKS_TREE)?;
        Ok(BlockStore {
            db,
            blocks,
        })
    }

    pub fn tip(&self) -> Result<Option<String>> {
        match self.blocks.get(TIP_KEY)? {
            Some(hash) => {
                let hash = String::from_utf8(hash.to_vec())
                    .map_err(|e| ChainError::CorruptRecord(format!("tip is not utf-8: {}", e)))?;
                Ok(Some(hash))
            }
            None => Ok(None),
        }
    }

    pub fn get_block(&self, hash: &str) -> Result<Block> {
        let bytes = self
            .blocks
            .get(hash.as_bytes())?
            .ok_or_else(|| ChainError::NotFound(hash.to_string()))?;
        let block = codec::decode(&bytes)?;
        if block.get_hash() != hash {
            return Err(ChainError::CorruptRecord(format!(
                "block stored under {} hashes to {}",
                hash,
                block.get_hash()
            )));
        }
        Ok(block)
    }

    /// Stores `block` and moves the tip to it atomically, then flushes.
    pub fn put_block(&self, block: &Block) -> Result<()> {
        let hash = block.get_hash();
        let bytes = codec::encode(block)?;
        let res: TransactionResult<()> = self.blocks.transaction(|tx_db| {
            tx_db.insert(hash.as_bytes(), bytes.as_slice())?;
            tx_db.insert(TIP_KEY.as_bytes(), hash.as_bytes())?;
            Ok(())
        });
        match res {
            Ok(()) => {}
            Err(TransactionError::Storage(e)) => return Err(e.into()),
            Err(TransactionError::Abort(())) => {
                return Err(ChainError::CorruptRecord(format!("write of block {} aborted", hash)))
            }
        }
        //Synchronously flushes all dirty IO buffers and calls fsync.
        self.db.flush()?;
        debug!("stored block {} ({} bytes), tip advanced", hash, bytes.len());
        Ok(())
    }

    /// Flushes and releases this handle.
    pub fn close(self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
