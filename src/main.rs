mod cli;

use std::process::exit;

use env_logger::{Builder, Env};

use crate::cli::Cli;

fn main() {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    let mut cli = Cli::new();
    if let Err(e) = cli.run() {
        eprintln!("Error: {}", e);
        exit(1);
    }
}
