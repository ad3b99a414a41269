//! Data models for the PicLet pipeline.
//!
//! This module contains all the core data structures used throughout the application:
//! - [`SessionState`]: Per-session state - current asset, cached background color, frame metadata
//! - [`StageKind`] / [`StageParams`] / [`PipelineRequest`]: The typed pipeline vocabulary
//! - [`Preset`] / [`IconSpec`]: Fixed output manifests for icon packs and store packs
//! - [`UserConfig`]: Engine and preview settings loaded from `PicLet Settings.yaml`
//! - [`PresetsConfig`]: User store-pack presets loaded from `PicLet Presets.yaml`
//! - [`MAX_CONCURRENT_SESSION_REQUESTS`]: Concurrency limit constant (always 1; session state is lock-per-request)
//!
//! # Architecture Note
//!
//! The models are designed to be:
//! - **Serializable**: Config and request structs derive `Serialize`/`Deserialize` for YAML/JSON boundaries
//! - **Cloneable**: SessionState is wrapped in `Arc<RwLock<>>` by [`SessionManager`](crate::session::SessionManager)
//! - **Validated at the boundary**: [`StageParams::validate`] rejects unusable parameters before any engine call

pub mod config;
pub mod preset;
pub mod session;
pub mod stage;

pub use config::{PicletSettings, PresetsConfig, UserConfig};
pub use preset::{IconSpec, Preset};
pub use session::{MAX_CONCURRENT_SESSION_REQUESTS, SessionState};
pub use stage::{
    OutputDescriptor, PipelineRequest, PreviewResult, ProcessResult, ScaleMode, StageKind,
    StageParams, StoreEntry,
};
