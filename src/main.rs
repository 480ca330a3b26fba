//! Split Engine CLI
//!
//! Reads one group's ledger CSV and prints every member's balance followed
//! by a suggested settlement plan.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- ledger.csv > balances.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use split_engine::{EngineError, GroupLedger, Result};
use std::env;
use std::fs::File;
use std::io::{self, BufReader};
use std::process;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        if e.is_integrity_violation() {
            eprintln!("Balances unavailable: the ledger data is inconsistent, please report it.");
        }
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        return Err(EngineError::MissingArgument);
    }

    let input_path = &args[1];
    let file = File::open(input_path)?;
    let reader = BufReader::new(file);

    let ledger = GroupLedger::from_csv(reader)?;

    let stdout = io::stdout();
    let handle = stdout.lock();
    ledger.write_output(handle)?;

    Ok(())
}
