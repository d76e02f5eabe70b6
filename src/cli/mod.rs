pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::utils::default_log_file;

#[derive(Parser)]
#[command(author, version, about = "Browser-driven product catalog crawler", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a file (the platform data directory when no path is given)
    #[arg(long, global = true, num_args = 0..=1, require_equals = true, value_name = "FILE")]
    log_file: Option<Option<PathBuf>>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Log file requested with `--log-file`, if any
    pub fn log_file(&self) -> Option<PathBuf> {
        self.log_file
            .as_ref()
            .map(|path| path.clone().unwrap_or_else(default_log_file))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full scrape now and wait for it
    Run,

    /// Scrape a single category
    Category {
        /// Category URL, absolute or relative to the base URL
        #[arg(required = true)]
        url: String,

        /// Name recorded on the scraped products
        #[arg(short, long, default_value = "Category")]
        name: String,
    },

    /// Serve the HTTP trigger API and run the cron schedule
    Serve {
        /// Address to bind (host:port), overrides the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Parse products out of a saved listing page
    Parse {
        /// Saved HTML listing page
        #[arg(required = true)]
        html_file: PathBuf,

        /// Category name to file products under
        #[arg(long, default_value = "Category")]
        category: String,

        /// Parent category label
        #[arg(long)]
        parent: Option<String>,
    },

    /// Show the number of stored products
    Status,

    /// Show the effective configuration
    Config,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run => {
            info!("Starting full scrape");
            commands::run(config_path).await
        }
        Commands::Category { url, name } => {
            info!("Starting scrape of category {}", name);
            commands::category(config_path, &url, &name).await
        }
        Commands::Serve { bind } => commands::serve(config_path, bind).await,
        Commands::Parse { html_file, category, parent } => {
            commands::parse(config_path, &html_file, &category, parent).await
        }
        Commands::Status => commands::status(config_path).await,
        Commands::Config => commands::show_config(config_path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["catalog-crawler", "category", "/c/snacks", "--verbose", "-c", "my.yaml"]).unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("my.yaml")));
        match cli.command {
            Commands::Category { url, name } => {
                assert_eq!(url, "/c/snacks");
                assert_eq!(name, "Category");
            }
            _ => panic!("expected category command"),
        }
    }

    #[test]
    fn test_log_file_flag() {
        let cli = Cli::try_parse_from(["catalog-crawler", "status"]).unwrap();
        assert_eq!(cli.log_file(), None);

        let cli = Cli::try_parse_from(["catalog-crawler", "--log-file", "status"]).unwrap();
        assert_eq!(cli.log_file(), Some(default_log_file()));

        let cli = Cli::try_parse_from(["catalog-crawler", "status", "--log-file=run.log"]).unwrap();
        assert_eq!(cli.log_file(), Some(PathBuf::from("run.log")));
    }
}
