use anyhow::Result;
use clap::Parser;

use weft::cli::{Cli, Commands};
use weft::{commands, logging};

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { monitor_id } => commands::run::execute(&cli.work_dir, &cli.config, monitor_id),
        Commands::Status => commands::status::execute(&cli.work_dir, &cli.config),
        Commands::Lock { action } => commands::lock::execute(&cli.work_dir, action),
        Commands::Init { force } => commands::init::execute(&cli.work_dir, &cli.config, force),
    }
}
