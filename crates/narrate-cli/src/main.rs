//! CLI entry point - the composition root.
//!
//! Installs logging, resolves the settings file and dispatches to the
//! command handlers.

use clap::Parser;
use narrate_cli::{Cli, Commands, handlers};
use narrate_core::default_settings_path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables (NARRATE_ENDPOINT, NARRATE_API_KEY)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(narrate_cli::error::exit_code_for(&e));
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli.config.or_else(default_settings_path);

    match cli.command {
        Commands::Read(args) => handlers::read::execute(args, settings_path.as_deref()).await,
        Commands::Segments(args) => handlers::segments::execute(&args),
    }
}
