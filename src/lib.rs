// PicLet - Image pipeline toolkit over an external raster engine
//
// This is the library crate containing the core business logic and data structures.
// The binary crate (main.rs) provides the CLI entry point.

pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod session;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use models::{PipelineRequest, PresetsConfig, SessionState, StageParams, UserConfig};
pub use services::{ImageOps, MagickEngine, ScratchSpace, Toolkit};
pub use session::{SessionEvent, SessionManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
