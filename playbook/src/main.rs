use anyhow::Result;
use clap::Parser;

use playbook::exit_codes;
use playbook::logging;
use playbook::play::{PlayArgs, play};

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::for_error(&err));
        }
    }
}

fn run() -> Result<i32> {
    let args = PlayArgs::parse();
    logging::init(args.verbose);
    let outcome = play(&args)?;
    Ok(outcome.exit_code())
}
