use clap::Parser;
use colored::Colorize;

use goip::cli::{Cli, Commands};
use goip::config::init_config;
use goip::runtime::modes::{check_config, generate_config, run_server};
use goip::system::{init_logging, install_panic_hook};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::GenerateConfig { output, force } => {
            if let Err(e) = generate_config(output.as_deref(), force) {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::CheckConfig => {
            if let Err(e) = check_config(&cli.config) {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Serve => {
            let config = match init_config(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e.format_colored());
                    eprintln!(
                        "{} Run `goip generate-config` for a sample configuration",
                        "hint:".cyan()
                    );
                    std::process::exit(1);
                }
            };

            // guard 需要在整个进程生命周期内保持
            let _log_guard = match init_logging(&config.log) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("{}", e.format_colored());
                    std::process::exit(1);
                }
            };
            install_panic_hook();

            tracing::info!(
                "{} v{} starting",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            );
            run_server(&config).await
        }
    }
}
