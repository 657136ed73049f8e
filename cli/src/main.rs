//! klive-disk: manage CIM containers and the FAT32 volumes inside them

mod commands;
mod config;
mod logger;

use commands::{CliError, USAGE};
use config::CliConfig;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help" | "help")) {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }

    let config = CliConfig::from_env();
    if logger::init(&config).is_err() {
        eprintln!("klive-disk: logger already installed");
    }

    match commands::run(&config, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(msg)) => {
            eprintln!("klive-disk: {}\n\n{}", msg, USAGE);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("klive-disk: {}", e);
            ExitCode::from(1)
        }
    }
}
