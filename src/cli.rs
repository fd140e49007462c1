use std::path::{Path, PathBuf};

use clap::{arg, value_parser, ArgMatches, Command};
use log::info;
use powledger::{
    constants::DEFAULT_DB_PATH, proof_of_work::ProofOfWork, Blockchain, Transaction, UTXOSet,
};
use serde_json::json;

pub struct Cli {}

impl Cli {
    pub fn new() -> Cli {
        Cli {}
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let matches = command().get_matches();
        self.dispatch(&matches)
    }

    fn dispatch(&mut self, matches: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(matches) = matches.subcommand_matches("createblockchain") {
            if let Some(address) = matches.get_one::<String>("ADDRESS") {
                cmd_create_blockchain(&datadir(matches), address)?;
                println!("Done!");
            }
        }

        if let Some(matches) = matches.subcommand_matches("getbalance") {
            if let Some(address) = matches.get_one::<String>("ADDRESS") {
                let balance = cmd_get_balance(&datadir(matches), address)?;
                println!("Balance of '{}': {}", address, balance);
            }
        }

        if let Some(matches) = matches.subcommand_matches("send") {
            let from = matches.get_one::<String>("FROM").ok_or("from not supplied")?;
            let to = matches.get_one::<String>("TO").ok_or("to not supplied")?;
            let amount = *matches.get_one::<u64>("AMOUNT").ok_or("amount not supplied")?;
            cmd_send(&datadir(matches), from, to, amount)?;
            println!("Success");
        }

        if let Some(matches) = matches.subcommand_matches("printchain") {
            let output = cmd_print_chain(&datadir(matches), matches.get_flag("json"))?;
            println!("{}", output);
        }
        Ok(())
    }
}

pub fn command() -> Command {
    Command::new("powledger")
        .version("0.1")
        .about("a single node proof of work ledger")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            arg!(-d --datadir <PATH> "directory holding the chain database")
                .default_value(DEFAULT_DB_PATH)
                .global(true),
        )
        .subcommand(
            Command::new("createblockchain")
                .about("Create a blockchain and send genesis block reward to ADDRESS")
                .arg(arg!(<ADDRESS> "The address to send genesis block reward to")),
        )
        .subcommand(
            Command::new("printchain")
                .about("Print all the blocks of the blockchain")
                .arg(arg!(--json "print blocks as json")),
        )
        .subcommand(
            Command::new("getbalance")
                .about("Get balance of ADDRESS")
                .arg(arg!(<ADDRESS> "The address to get balance for")),
        )
        .subcommand(
            Command::new("send")
                .about("Send AMOUNT of coins from FROM address to TO")
                .arg(arg!(<FROM> "Source wallet address"))
                .arg(arg!(<TO> "Destination wallet address"))
                .arg(arg!(<AMOUNT> "Amount to send").value_parser(value_parser!(u64))),
        )
}

fn datadir(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("datadir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

fn cmd_create_blockchain(path: &Path, address: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bc = Blockchain::create_blockchain(path, address)?;
    bc.close()?;
    Ok(())
}

fn cmd_get_balance(path: &Path, address: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let bc = Blockchain::new(path)?;
    let balance = UTXOSet::new(&bc).get_balance(address)?;
    bc.close()?;
    Ok(balance)
}

fn cmd_send(path: &Path, from: &str, to: &str, amount: u64) -> Result<(), Box<dyn std::error::Error>> {
    let mut bc = Blockchain::new(path)?;
    let tx = Transaction::new_utxo(from, to, amount, &bc)?;
    let block = bc.mine_block(vec![tx])?;
    info!("sent {} from {} to {} in block {}", amount, from, to, block.get_hash());
    bc.close()?;
    Ok(())
}

fn cmd_print_chain(path: &Path, as_json: bool) -> Result<String, Box<dyn std::error::Error>> {
    let bc = Blockchain::new(path)?;
    let mut text = Vec::new();
    let mut blocks = Vec::new();
    for block in bc.iter() {
        let block = block?;
        let valid = ProofOfWork::new(&block).validate()?;
        if as_json {
            blocks.push(json!({ "block": block, "pow": valid }));
        } else {
            text.push(format!("{}\nPoW: {}\n", block, valid));
        }
    }
    bc.close()?;
    if as_json {
        Ok(serde_json::to_string_pretty(&blocks)?)
    } else {
        Ok(text.join("\n"))
    }
}
