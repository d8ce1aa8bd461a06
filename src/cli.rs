use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "enclosure")]
#[command(about = "Resolve video pages into direct media links for RSS enclosures", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $ENCLOSURE_CONFIG or config/enclosure.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Resolve one page URL and print the result as JSON
    Resolve(ResolveArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct ResolveArgs {
    /// Video page URL, short link, or BV/av id
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolve_with_config() {
        let cli = Cli::parse_from(["enclosure", "resolve", "BV1xx411c7mD", "--config", "alt.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        assert!(matches!(cli.command, Commands::Resolve(ResolveArgs { ref url }) if url == "BV1xx411c7mD"));
    }

    #[test]
    fn test_parse_server_address() {
        let cli = Cli::parse_from(["enclosure", "server", "--address", "127.0.0.1:9000"]);
        let Commands::Server(args) = cli.command else {
            panic!("expected server command");
        };
        assert_eq!(args.address, Some("127.0.0.1:9000".parse().unwrap()));
    }
}
