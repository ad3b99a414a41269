//! Services module - Pure business logic for image pipeline operations.
//!
//! This module contains all the core business logic for running image
//! transformations through the external ImageMagick engine. The services are
//! **framework-agnostic** and have no dependencies on any frontend layer,
//! making them testable and reusable.
//!
//! # Components
//!
//! - [`ImageOps`] / [`MagickEngine`]: The engine boundary. Every pixel
//!   operation is one named primitive executed as a `magick` subprocess
//!   with a timeout; nothing else in the crate touches image data.
//!
//! - [`PipelineExecutor`]: Runs the selected stages in their fixed
//!   dependency order, threading a single working artifact from stage to
//!   stage and persisting durable outputs next to the source file.
//!
//! - [`PreviewGenerator`]: The same stage transforms, scratch-only, capped
//!   to a preview dimension and returned as inline base64 PNG.
//!
//! - [`AnimationController`]: Frame-level edits (delete, replace, simplify)
//!   and GIF export for multi-frame assets. Edits produce a new canonical
//!   asset; the session swaps to it only after validation.
//!
//! - [`Toolkit`]: The public per-session surface. Serializes requests with
//!   a session-wide lock and owns engine, scratch space, and session state.
//!
//! # Design Philosophy
//!
//! The services layer is designed to be:
//! - **Pure**: No side effects beyond file I/O and subprocess execution
//! - **Async**: All operations use tokio for non-blocking I/O
//! - **Testable**: [`ImageOps`] is a trait, so tests substitute a fake
//!   engine and never need ImageMagick installed
//! - **Framework-agnostic**: No frontend code, only business logic
//!
//! # Usage Example
//!
//! ```ignore
//! use piclet::services::{build_engine, ScratchSpace, Toolkit};
//!
//! let engine = build_engine(None, Duration::from_secs(30)).await?;
//! let toolkit = Toolkit::new(Arc::new(engine), ScratchSpace::new()?, 512);
//!
//! toolkit.open(Utf8Path::new("cat.png")).await?;
//! let result = toolkit.run_process(&request).await?;
//! ```
//!
//! # Engine Integration
//!
//! The engine boundary integrates with ImageMagick by:
//! 1. Probing the configured binary (falling back to `magick` on PATH)
//! 2. Running each primitive as one subprocess under a timeout
//! 3. Wrapping whole-image transforms in `-coalesce`/`-layers optimize`
//!    for GIF inputs so every frame is processed
//! 4. Treating a non-zero exit or timeout as that operation's failure

pub mod animation;
pub mod artifact;
pub mod engine;
pub mod executor;
pub mod preview;
pub mod toolkit;

pub use animation::{AnimationController, ExportMode, FrameEditOutcome, FrameError};
pub use artifact::{ScratchSpace, WorkingArtifact, derive_output_dir, derive_output_path};
pub use engine::{EngineError, ImageOps, MagickEngine, build_engine, detect_engine};
pub use executor::{PipelineError, PipelineExecutor};
pub use preview::PreviewGenerator;
pub use toolkit::{FrameEdit, Toolkit};
