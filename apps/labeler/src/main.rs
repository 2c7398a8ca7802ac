mod cli;
mod commands;
mod render;
mod run;

use clap::Parser;
use cli::{Cli, Commands};
use label_config::ConfigStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { Some("debug") } else { None };
    match &cli.log_dir {
        Some(log_dir) => app_tracing::init_tracing_to_file(log_dir.clone(), directive),
        None => app_tracing::init_tracing_to_stdout(directive),
    }

    let config_path = cli.config.clone().unwrap_or_else(ConfigStore::default_path);
    tracing::debug!("config file: {}", config_path.display());
    let store = Arc::new(ConfigStore::open(config_path));

    match cli.command {
        Commands::Dirs(command) => commands::dirs(&store, command),
        Commands::Config(command) => commands::config(&store, command),
        Commands::Run(args) => run::run(store, args).await,
        Commands::Show(args) => run::show(store, args).await,
    }
}
