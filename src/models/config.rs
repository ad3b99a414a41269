use crate::models::preset::Preset;
use serde::{Deserialize, Serialize};

/// User configuration from PicLet Settings.yaml
///
/// Contains engine location, timeouts, and preview behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "PicLet_Settings")]
    pub piclet_settings: PicletSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicletSettings {
    /// Explicit path to the ImageMagick binary. Empty means "probe PATH".
    #[serde(rename = "Engine Path", default)]
    pub engine_path: String,

    #[serde(rename = "Engine Timeout", default = "default_engine_timeout")]
    pub engine_timeout: u32,

    #[serde(rename = "Preview Max Dimension", default = "default_preview_max_dim")]
    pub preview_max_dim: u32,

    /// Directory for working artifacts. Empty means "use a private temp dir".
    #[serde(rename = "Scratch Directory", default)]
    pub scratch_dir: String,

    #[serde(rename = "Stat Logging", default)]
    pub stat_logging: bool,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for PicletSettings {
    fn default() -> Self {
        Self {
            engine_path: String::new(),
            engine_timeout: 30,
            preview_max_dim: 512,
            scratch_dir: String::new(),
            stat_logging: true,
            debug_mode: false,
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            piclet_settings: PicletSettings::default(),
        }
    }
}

fn default_engine_timeout() -> u32 {
    30
}

fn default_preview_max_dim() -> u32 {
    512
}

/// User-defined store-pack presets from PicLet Presets.yaml
///
/// These are merged over the built-in presets by id; built-ins cannot be
/// deleted, only shadowed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetsConfig {
    #[serde(rename = "PicLet_Presets", default)]
    pub presets: Vec<Preset>,
}
