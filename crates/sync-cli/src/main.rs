mod cli;
mod conflicts;
mod context;
mod run;
mod stub;

use clap::Parser;
use cli::{Cli, Commands};
use eyre::Result;
use sync_core::config;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let Cli { config_dir, command } = Cli::parse();
    if let Some(dir) = config_dir.as_ref() {
        config::set_config_dir(dir);
    }

    match command {
        Commands::Plan(args) => run::run_plan(&args).await?,
        Commands::Run(args) => run::run_sync(&args).await?,
        Commands::Conflicts(args) => conflicts::run_list(&args)?,
        Commands::Resolve(args) => conflicts::run_resolve(&args)?,
    }

    Ok(())
}
