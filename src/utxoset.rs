//! Unspent output discovery by full backward scan.
//!
//! Nothing is cached: every query walks the chain from the tip, recording
//! which outputs later inputs have consumed before it reaches the blocks
//! that created them.

use std::{
    collections::{HashMap, HashSet},
    ops::ControlFlow,
};

use log::debug;
use serde::Serialize;

use crate::{
    blockchain::Blockchain,
    errors::{ChainError, Result},
    tx::TXOutput,
};

/// Position and value of an output nobody has spent yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UnspentOutput {
    pub txid: String,
    pub index: i32,
    pub value: u64,
}

pub struct UTXOSet<'a> {
    blockchain: &'a Blockchain,
}

impl<'a> UTXOSet<'a> {
    pub fn new(blockchain: &'a Blockchain) -> Self {
        UTXOSet { blockchain }
    }

    /// Visits every unspent output, most recent block first and in block
    /// order within a block, until `visit` breaks.
    fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&str, i32, &TXOutput) -> ControlFlow<()>,
    {
        let mut spent_txos: HashMap<String, HashSet<i32>> = HashMap::new();
        for block in self.blockchain.iter() {
            for tx in block?.get_transactions() {
                let spent = spent_txos.get(&tx.id);
                for (index, out) in tx.vout.iter().enumerate() {
                    let index = i32::try_from(index).map_err(|_| {
                        ChainError::CorruptRecord(format!("transaction {} has too many outputs", tx.id))
                    })?;
                    if spent.map_or(false, |s| s.contains(&index)) {
                        continue;
                    }
                    if visit(&tx.id, index, out).is_break() {
                        return Ok(());
                    }
                }
                // inputs always sit in a later block than the outputs they
                // consume, so they are recorded before those are reached
                if !tx.is_coinbase() {
                    for vin in &tx.vin {
                        spent_txos.entry(vin.txid.clone()).or_default().insert(vin.vout);
                    }
                }
            }
        }
        Ok(())
    }

    /// Every unspent output locked to `address`.
    pub fn find_unspent_outputs(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let mut utxos = Vec::new();
        self.scan(|txid, index, out| {
            if out.can_be_unlocked_with(address) {
                utxos.push(UnspentOutput {
                    txid: txid.to_string(),
                    index,
                    value: out.value,
                });
            }
            ControlFlow::Continue(())
        })?;
        Ok(utxos)
    }

    pub fn get_balance(&self, address: &str) -> Result<u64> {
        let balance: u64 = self
            .find_unspent_outputs(address)?
            .iter()
            .map(|out| out.value)
            .sum();
        debug!("balance of {} is {}", address, balance);
        Ok(balance)
    }

    /// First-fit selection of unspent outputs of `address` in scan order.
    /// Stops as soon as `amount` is covered; otherwise the returned total is
    /// everything `address` can spend.
    pub fn find_spendable_outputs(&self, address: &str, amount: u64) -> Result<(u64, Vec<UnspentOutput>)> {
        let mut accumulated: u64 = 0;
        let mut unspent_outputs = Vec::new();
        self.scan(|txid, index, out| {
            if !out.can_be_unlocked_with(address) {
                return ControlFlow::Continue(());
            }
            accumulated = accumulated.saturating_add(out.value);
            unspent_outputs.push(UnspentOutput {
                txid: txid.to_string(),
                index,
                value: out.value,
            });
            if accumulated >= amount {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok((accumulated, unspent_outputs))
    }

    /// All unspent outputs of every address, keyed by (txid, index).
    pub fn unspent_index(&self) -> Result<HashMap<(String, i32), TXOutput>> {
        let mut index = HashMap::new();
        self.scan(|txid, vout, out| {
            index.insert((txid.to_string(), vout), out.clone());
            ControlFlow::Continue(())
        })?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{constants::SUBSIDY, transaction::Transaction, tx::TXInput};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::path::Path;
    use tempfile::TempDir;

    const ADDRESSES: [&str; 4] = ["alice", "bob", "carol", "dave"];

    fn send(bc: &mut Blockchain, from: &str, to: &str, amount: u64) -> Result<()> {
        let tx = Transaction::new_utxo(from, to, amount, bc)?;
        bc.mine_block(vec![tx])?;
        Ok(())
    }

    fn new_chain(dir: &Path, address: &str) -> Blockchain {
        Blockchain::create_blockchain(dir.join("chain"), address).unwrap()
    }

    #[test]
    fn test_send_scenario() {
        let dir = TempDir::new().unwrap();
        let mut bc = new_chain(dir.path(), "A");
        assert_eq!(UTXOSet::new(&bc).get_balance("A").unwrap(), SUBSIDY);
        assert_eq!(UTXOSet::new(&bc).get_balance("B").unwrap(), 0);

        send(&mut bc, "A", "B", 4).unwrap();
        assert_eq!(UTXOSet::new(&bc).get_balance("A").unwrap(), 6);
        assert_eq!(UTXOSet::new(&bc).get_balance("B").unwrap(), 4);

        let tip = bc.tip().to_string();
        match send(&mut bc, "A", "B", 1000) {
            Err(ChainError::InsufficientFunds { needed, available }) => {
                assert_eq!(needed, 1000);
                assert_eq!(available, 6);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(bc.tip(), tip);
        assert_eq!(bc.iter().count(), 2);
        assert_eq!(UTXOSet::new(&bc).get_balance("A").unwrap(), 6);
    }

    #[test]
    fn test_spent_outputs_disappear() {
        let dir = TempDir::new().unwrap();
        let mut bc = new_chain(dir.path(), "alice");
        let genesis_id = bc.get_block(bc.tip()).unwrap().get_transactions()[0].id.clone();
        assert_eq!(
            UTXOSet::new(&bc).find_unspent_outputs("alice").unwrap(),
            vec![UnspentOutput {
                txid: genesis_id.clone(),
                index: 0,
                value: SUBSIDY,
            }]
        );

        send(&mut bc, "alice", "bob", SUBSIDY).unwrap();
        let utxos = UTXOSet::new(&bc);
        assert!(utxos.find_unspent_outputs("alice").unwrap().is_empty());
        let bob = utxos.find_unspent_outputs("bob").unwrap();
        assert_eq!(bob.len(), 1);
        assert_ne!(bob[0].txid, genesis_id);
        assert!(!utxos.unspent_index().unwrap().contains_key(&(genesis_id, 0)));
    }

    #[test]
    fn test_spendable_outputs_short_circuit() {
        let dir = TempDir::new().unwrap();
        let mut bc = new_chain(dir.path(), "alice");
        for i in 0..2 {
            let cb = Transaction::new_coinbase("alice", &format!("reward {}", i)).unwrap();
            bc.mine_block(vec![cb]).unwrap();
        }
        let utxos = UTXOSet::new(&bc);
        assert_eq!(utxos.get_balance("alice").unwrap(), 3 * SUBSIDY);

        let (acc, picked) = utxos.find_spendable_outputs("alice", 1).unwrap();
        assert_eq!(acc, SUBSIDY);
        assert_eq!(picked.len(), 1);
        // newest block first
        assert_eq!(picked[0].txid, bc.get_block(bc.tip()).unwrap().get_transactions()[0].id);

        let (acc, picked) = utxos.find_spendable_outputs("alice", SUBSIDY + 1).unwrap();
        assert_eq!((acc, picked.len()), (2 * SUBSIDY, 2));

        let (acc, picked) = utxos.find_spendable_outputs("alice", 100 * SUBSIDY).unwrap();
        assert_eq!((acc, picked.len()), (3 * SUBSIDY, 3));

        let tx = Transaction::new_utxo("alice", "bob", SUBSIDY + 1, &bc).unwrap();
        assert_eq!(tx.vin.len(), 2);
        assert_eq!(tx.vout[1].value, SUBSIDY - 1);
    }

    #[test]
    fn test_spend_within_one_block_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bc = new_chain(dir.path(), "alice");
        let tip = bc.tip().to_string();
        let first = Transaction::new_utxo("alice", "bob", 4, &bc).unwrap();
        let mut second = Transaction {
            id: String::new(),
            vin: vec![TXInput {
                txid: first.id.clone(),
                vout: 0,
                script_sig: "bob".to_string(),
            }],
            vout: vec![TXOutput::new(4, "carol")],
        };
        second.id = second.hash().unwrap();
        assert!(matches!(
            bc.mine_block(vec![first.clone(), second.clone()]),
            Err(ChainError::InvalidTransaction { .. })
        ));
        assert_eq!(bc.tip(), tip);

        bc.mine_block(vec![first]).unwrap();
        bc.mine_block(vec![second]).unwrap();
        let utxos = UTXOSet::new(&bc);
        assert_eq!(utxos.get_balance("bob").unwrap(), 0);
        assert_eq!(utxos.get_balance("carol").unwrap(), 4);
        assert_eq!(utxos.get_balance("alice").unwrap(), SUBSIDY - 4);
    }

    #[test]
    fn test_random_transfers_conserve_value() {
        let dir = TempDir::new().unwrap();
        let mut bc = new_chain(dir.path(), ADDRESSES[0]);
        let mut rng = StdRng::seed_from_u64(7);

        let mut mined = 0;
        let mut attempts = 0;
        while mined < 6 && attempts < 50 {
            attempts += 1;
            let from = ADDRESSES[rng.gen_range(0..ADDRESSES.len())];
            let to = ADDRESSES[rng.gen_range(0..ADDRESSES.len())];
            let amount = rng.gen_range(1..=SUBSIDY);
            let tip = bc.tip().to_string();
            match send(&mut bc, from, to, amount) {
                Ok(()) => mined += 1,
                Err(ChainError::InsufficientFunds { .. }) => assert_eq!(bc.tip(), tip),
                Err(e) => panic!("transfer failed: {}", e),
            }
        }
        assert!(mined > 0);

        let mut created = 0u64;
        let mut consumed = 0u64;
        let mut outputs: HashMap<(String, i32), u64> = HashMap::new();
        let mut inputs: HashSet<(String, i32)> = HashSet::new();
        for block in bc.iter() {
            for tx in block.unwrap().get_transactions() {
                for (i, out) in tx.vout.iter().enumerate() {
                    created += out.value;
                    outputs.insert((tx.id.clone(), i as i32), out.value);
                }
                if !tx.is_coinbase() {
                    for vin in &tx.vin {
                        assert!(inputs.insert((vin.txid.clone(), vin.vout)), "output spent twice");
                    }
                }
            }
        }
        for outpoint in &inputs {
            consumed += outputs[outpoint];
        }

        let utxos = UTXOSet::new(&bc);
        let mut total = 0;
        for address in ADDRESSES {
            total += utxos.get_balance(address).unwrap();
            for out in utxos.find_unspent_outputs(address).unwrap() {
                assert!(!inputs.contains(&(out.txid, out.index)));
            }
        }
        assert_eq!(total, SUBSIDY);
        assert_eq!(created - consumed, total);
    }
}
