use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    blockchain::Blockchain,
    constants::SUBSIDY,
    errors::{ChainError, Result},
    tx::{TXInput, TXOutput},
    utxoset::UTXOSet,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    // transaction identifier, hex sha256 over everything else
    pub id: String,
    // inputs to the transaction (sources of funds)
    pub vin: Vec<TXInput>,
    // outputs of the transaction (destinations for funds)
    pub vout: Vec<TXOutput>,
}

impl Transaction {
    /// Builds a transfer of `amount` from `from` to `to`, spending the first
    /// unspent outputs of `from` found walking back from the tip. Any excess
    /// over `amount` comes back to `from` as a change output.
    pub fn new_utxo(from: &str, to: &str, amount: u64, bc: &Blockchain) -> Result<Transaction> {
        if amount == 0 {
            return Err(ChainError::InvalidAmount(amount));
        }
        let (accumulated, spendable) = UTXOSet::new(bc).find_spendable_outputs(from, amount)?;
        if accumulated < amount {
            debug!("not enough balance: {} has {}, needs {}", from, accumulated, amount);
            return Err(ChainError::InsufficientFunds {
                needed: amount,
                available: accumulated,
            });
        }

        let vin = spendable
            .iter()
            .map(|out| TXInput {
                txid: out.txid.clone(),
                vout: out.index,
                script_sig: from.to_string(),
            })
            .collect();

        let mut vout = vec![TXOutput::new(amount, to)];
        if accumulated > amount {
            vout.push(TXOutput::new(accumulated - amount, from));
        }

        let mut tx = Transaction {
            id: String::new(),
            vin,
            vout,
        };
        tx.id = tx.hash()?;
        debug!("new transaction {} spends {} inputs", tx.id, tx.vin.len());
        Ok(tx)
    }

    pub fn new_coinbase(to: &str, data: &str) -> Result<Transaction> {
        info!("new coinbase Transaction to : {}", to);
        let data = if data.is_empty() {
            format!("Reward to '{}'", to)
        } else {
            data.to_string()
        };
        let mut tx = Transaction {
            id: String::new(),
            vin: vec![TXInput {
                txid: String::new(),
                vout: -1,
                script_sig: data,
            }],
            vout: vec![TXOutput::new(SUBSIDY, to)],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Content hash with `id` held out of the preimage.
    pub fn hash(&self) -> Result<String> {
        let mut copy = self.clone();
        copy.id = String::new();
        let data = bincode::serialize(&copy)?;
        Ok(hex::encode(Sha256::digest(&data)))
    }

    /// Exactly one input, with an empty reference and index -1.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == -1
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id: {}", self.id)?;
        for input in &self.vin {
            write!(f, "\n{}", input)?;
        }
        for output in &self.vout {
            write!(f, "\n{}", output)?;
        }
        Ok(())
    }
}
