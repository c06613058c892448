use crate::cli::CrosswindCli;
use clap::Parser;

/// Initialise the CLI and logging for the crosswind runner.
pub fn init() -> CrosswindCli {
    env_logger::init();

    CrosswindCli::parse()
}
