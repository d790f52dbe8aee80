use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use halo::commands;
use halo::logging;

#[derive(Parser)]
#[command(version, about = "Headless simulation harness for the halo effect engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate an effect catalog
    CheckCatalog {
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
    /// Run a scenario against a catalog and print every tick
    Simulate {
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        #[arg(short, long)]
        scenario: PathBuf,
        /// Defaults to one past the last scheduled action
        #[arg(short, long)]
        ticks: Option<u64>,
        #[arg(long)]
        tick_ms: Option<u64>,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let mut config = commands::load_config();

    let result = match cli.command {
        Commands::CheckCatalog { catalog } => commands::resolve_catalog_path(catalog, &config)
            .and_then(|path| commands::check_catalog(&path)),
        Commands::Simulate {
            catalog,
            scenario,
            ticks,
            tick_ms,
        } => {
            if let Some(tick_ms) = tick_ms {
                config.tick_ms = tick_ms;
            }
            commands::resolve_catalog_path(catalog, &config)
                .and_then(|path| commands::simulate(&path, &scenario, ticks, config))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
