//! Command-line interface definitions using clap
//!
//! This module defines the CLI structure for goip using clap's derive macros.

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// goip - IP geolocation lookup service
#[derive(Parser, Debug)]
#[command(name = "goip")]
#[command(version)]
#[command(about = "IP geolocation lookup service", long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Print a sample configuration file
    GenerateConfig {
        /// Write to this file instead of stdout
        output: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_serve_with_default_config() {
        let cli = Cli::try_parse_from(["goip"]).unwrap();
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_config_flag_and_subcommands() {
        let cli = Cli::try_parse_from(["goip", "-c", "/etc/goip.toml", "check-config"]).unwrap();
        assert_eq!(cli.config, "/etc/goip.toml");
        assert_eq!(cli.command, Some(Commands::CheckConfig));

        let cli = Cli::try_parse_from(["goip", "generate-config", "out.toml", "--force"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::GenerateConfig {
                output: Some("out.toml".to_string()),
                force: true
            })
        );
    }
}
