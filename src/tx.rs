use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TXInput {
    // the id of the transaction that contains the output
    // being spent, empty for a coinbase
    pub txid: String,
    // the index of the output in the previous transaction, -1 for a coinbase
    pub vout: i32,
    // plaintext owner claim, compared verbatim with the output lock
    pub script_sig: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TXOutput {
    // amount of funds this output represents
    pub value: u64,
    // the address that may spend this output
    pub script_pub_key: String,
}

impl TXInput {
    /// Plain string comparison of the claim against an output lock.
    pub fn can_unlock_output_with(&self, unlocking_data: &str) -> bool {
        self.script_sig == unlocking_data
    }
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Self {
        TXOutput {
            value,
            script_pub_key: address.to_string(),
        }
    }

    pub fn can_be_unlocked_with(&self, unlocking_data: &str) -> bool {
        self.script_pub_key == unlocking_data
    }
}

impl fmt::Display for TXInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(25))?;
        writeln!(f, "Txid: {}", self.txid)?;
        writeln!(f, "Vout: {}", self.vout)?;
        write!(f, "ScriptSig: {}", self.script_sig)
    }
}

impl fmt::Display for TXOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(25))?;
        writeln!(f, "Value: {}", self.value)?;
        write!(f, "ScriptPubKey: {}", self.script_pub_key)
    }
}
