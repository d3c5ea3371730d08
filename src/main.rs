use anyhow::Result;
use candle_indicator_cache::cli::{execute_command, Cli};
use candle_indicator_cache::config::Settings;
use clap::Parser;

fn main() -> Result<()> {
    // Initialize environment
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    execute_command(&settings, cli.command)
}
