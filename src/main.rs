//! PicLet - Image pipeline toolkit over an external raster engine
//!
//! Main entry point for the CLI.
//!
//! # Overview
//!
//! This binary crate provides the command-line frontend for PicLet. It
//! initializes:
//! - Logging infrastructure (file rotation + console output)
//! - Tokio async runtime (subprocess execution and file I/O)
//! - Configuration loading ([`piclet::ConfigManager`])
//! - The per-session [`piclet::Toolkit`] dispatched by subcommand
//!
//! # Execution Flow
//!
//! 1. Parse the command line
//! 2. Initialize logging → logs/piclet.<date>
//! 3. Load YAML configuration from PicLet Data/
//! 4. Probe for the ImageMagick binary
//! 5. Run the subcommand against a fresh session
//!
//! # Configuration Files
//!
//! Expected in `PicLet Data/` directory:
//! - `PicLet Settings.yaml`: Engine path, timeouts, scratch directory
//! - `PicLet Presets.yaml`: User store-pack presets (optional)

use anyhow::Result;
use clap::Parser;
use piclet::cli::{self, Cli};
use piclet::{APP_NAME, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Setup logging with both file and console output. The guard must stay
    // alive for the duration of the program.
    let _guard = piclet::logging::setup_logging("logs", "piclet", args.debug, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let result = cli::run(args).await;

    match &result {
        Ok(()) => tracing::info!("Done"),
        Err(e) => tracing::error!("Failed: {:#}", e),
    }

    result
}
