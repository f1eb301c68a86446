use std::process::ExitCode;

use clap::Parser;

use skinpaint::cli;
use skinpaint::logger;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = cli::CliArgs::parse();
    cli::run(args)
}
