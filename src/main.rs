mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use enclosure::config::Config;
use enclosure::observability::{self, Metrics};
use enclosure::resolver::Resolver;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .map_err(|e| format!("Failed to load config: {}", e))?;

    match cli.command {
        Commands::Server(args) => enclosure::api::run(config, args.address).await?,
        Commands::Resolve(args) => {
            let resolver = Resolver::from_config(&config, Arc::new(Metrics::new()))?;
            let media = resolver.resolve(&args.url).await?;
            println!("{}", serde_json::to_string_pretty(&media)?);
        }
    }

    Ok(())
}
