//! `deployctl` - validate, order, deploy and export deployment configurations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deploy_config::{ExportFormat, parser};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::deploy::OutputFormat;

#[derive(Parser)]
#[command(name = "deployctl")]
#[command(about = "Dependency-aware deployment orchestration tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "deployment.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration against its environment's rules
    Validate,

    /// Print the deployment and shutdown order
    Order,

    /// Deploy with the in-memory service manager, report, then tear down
    Deploy {
        /// Seconds to keep the deployment up before tearing it down
        #[arg(long, default_value_t = 0)]
        hold: u64,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Write the configuration back out as YAML or JSON
    Export {
        /// Output format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: ExportFormat,

        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// `RUST_LOG` wins, then `--verbose`, then the file's `log_level`
fn init_tracing(verbose: bool, config_level: Option<&str>) {
    let level = if verbose {
        "debug"
    } else {
        config_level.unwrap_or("info")
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = parser::parse_file(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    init_tracing(cli.verbose, config.settings.log_level.as_deref());

    smol::block_on(async {
        match cli.command {
            Commands::Validate => commands::validate::run(&config),
            Commands::Order => commands::order::run(&config),
            Commands::Deploy { hold, format } => commands::deploy::run(&config, hold, format).await,
            Commands::Export { format, output } => {
                commands::export::run(&config, format, output.as_deref())
            }
        }
    })
}
