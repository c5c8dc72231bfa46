//! Command-line interface definition.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// contractkit - typed HTTP and socket contracts
#[derive(Debug, Parser)]
#[command(name = "contractkit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CONTRACTKIT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the demo contract until interrupted
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: IpAddr,

        /// Port to bind
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// Prefix of every endpoint route
        #[arg(long, default_value = "")]
        base_path: String,

        /// Hide validation diagnostics from error responses
        #[arg(long)]
        obfuscate: bool,

        /// Serve the OpenAPI document and page at /docs
        #[arg(long)]
        docs: bool,
    },

    /// Call the demo getPerson endpoint
    People {
        /// First name (Bob, Douglas or Jeremy)
        first: String,

        /// Last name (Smith, Jones or Williams)
        last: String,

        /// Authorization header (defaults to the configured one)
        #[arg(long, env = "CONTRACTKIT_AUTHORIZATION")]
        authorization: Option<String>,
    },

    /// Print the demo OpenAPI document
    Docs {
        /// Base path the routes are served under
        #[arg(long, default_value = "")]
        base_path: String,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["contractkit", "serve", "--docs"]).unwrap();
        let Command::Serve {
            bind,
            port,
            base_path,
            obfuscate,
            docs,
        } = cli.command
        else {
            panic!("expected serve");
        };
        assert_eq!(bind.to_string(), "127.0.0.1");
        assert_eq!(port, 3000);
        assert_eq!(base_path, "");
        assert!(!obfuscate);
        assert!(docs);
    }

    #[test]
    fn people_takes_two_names() {
        let cli = Cli::try_parse_from(["contractkit", "-v", "people", "Bob", "Smith"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::People { ref first, ref last, .. } if first == "Bob" && last == "Smith"
        ));
        assert!(Cli::try_parse_from(["contractkit", "people", "Bob"]).is_err());
    }
}
