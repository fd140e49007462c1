/// Required leading zero bits of a block hash (4 hex zeros).
pub const TARGET_BITS: u32 = 16;

/// Value minted by every coinbase transaction.
pub const SUBSIDY: u64 = 10;

pub const GENESIS_COINBASE_DATA: &str =
    "The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

/// Reserved key holding the hash of the tip block.
pub const TIP_KEY: &str = "LAST";

pub const BLOCKS_TREE: &str = "blocks";

pub const DEFAULT_DB_PATH: &str = "data/blocks";
