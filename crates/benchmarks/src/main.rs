//! benchmatvec: autotune a matrix-vector kernel.

use clap::Parser;
use gemvtune_driver::cli::{run_cli, Cli};
use std::process::ExitCode;

/// Last line of every run, so a supervising process knows not to respawn.
const DONE_SENTINEL: &str = "***DONE***";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            eprintln!("{DONE_SENTINEL}");
            return ExitCode::FAILURE;
        }
    };

    match run_cli(cli) {
        Ok(()) => {
            println!("{DONE_SENTINEL}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            eprintln!("{DONE_SENTINEL}");
            ExitCode::FAILURE
        }
    }
}
