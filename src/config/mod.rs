use crate::models::{Preset, PresetsConfig, UserConfig};
use crate::models::preset::merge_presets;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// Configuration manager for loading and saving YAML configuration files.
///
/// Manages two primary configuration files:
/// - User config (`PicLet Settings.yaml`): Engine path, timeouts, preview settings
/// - Presets config (`PicLet Presets.yaml`): User-defined store-pack presets
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    user_config_path: Utf8PathBuf,
    presets_config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// # Arguments
    /// * `config_dir` - Directory containing configuration files (e.g., "PicLet Data")
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        // Create config directory if it doesn't exist
        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            user_config_path: config_dir.join("PicLet Settings.yaml"),
            presets_config_path: config_dir.join("PicLet Presets.yaml"),
            config_dir,
        })
    }

    /// Load the user configuration file.
    ///
    /// # Returns
    /// The loaded UserConfig, or default if file doesn't exist
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.user_config_path.exists() {
            tracing::warn!(
                "User config file not found at {}, using defaults",
                self.user_config_path
            );
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.user_config_path)
            .with_context(|| format!("Failed to read user config: {}", self.user_config_path))?;

        let config: UserConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse user config: {}", self.user_config_path))?;

        tracing::info!("Loaded user config from {}", self.user_config_path);
        Ok(config)
    }

    /// Save the user configuration file.
    pub fn save_user_config(&self, config: &UserConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize user config to YAML")?;

        fs::write(&self.user_config_path, yaml_string)
            .with_context(|| format!("Failed to write user config: {}", self.user_config_path))?;

        tracing::info!("Saved user config to {}", self.user_config_path);
        Ok(())
    }

    /// Load the user presets file.
    ///
    /// # Returns
    /// The loaded PresetsConfig, or default (no user presets) if file doesn't exist
    pub fn load_presets_config(&self) -> Result<PresetsConfig> {
        if !self.presets_config_path.exists() {
            tracing::warn!(
                "Presets file not found at {}, using built-ins only",
                self.presets_config_path
            );
            return Ok(PresetsConfig::default());
        }

        let file_contents = fs::read_to_string(&self.presets_config_path).with_context(|| {
            format!("Failed to read presets config: {}", self.presets_config_path)
        })?;

        let config: PresetsConfig = serde_yaml_ng::from_str(&file_contents).with_context(|| {
            format!("Failed to parse presets config: {}", self.presets_config_path)
        })?;

        tracing::info!("Loaded presets config from {}", self.presets_config_path);
        Ok(config)
    }

    /// Save the user presets file.
    pub fn save_presets_config(&self, config: &PresetsConfig) -> Result<()> {
        let yaml_string = serde_yaml_ng::to_string(config)
            .context("Failed to serialize presets config to YAML")?;

        fs::write(&self.presets_config_path, yaml_string).with_context(|| {
            format!("Failed to write presets config: {}", self.presets_config_path)
        })?;

        tracing::info!("Saved presets config to {}", self.presets_config_path);
        Ok(())
    }

    /// Built-in presets with the user's presets merged over them by id.
    ///
    /// Built-ins can be shadowed but never deleted; a user preset with a
    /// fresh id is appended after them.
    pub fn merged_presets(&self) -> Result<IndexMap<String, Preset>> {
        let user = self.load_presets_config()?;
        Ok(merge_presets(user.presets))
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::preset::IconSpec;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let manager = ConfigManager::new(&config_path).unwrap();
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (_manager, _temp_dir) = create_test_config_manager();
    }

    #[test]
    fn test_load_save_user_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = UserConfig::default();
        manager.save_user_config(&config).unwrap();

        let loaded = manager.load_user_config().unwrap();
        assert_eq!(loaded.piclet_settings.engine_timeout, 30);
        assert_eq!(loaded.piclet_settings.preview_max_dim, 512);
    }

    #[test]
    fn test_missing_user_config_uses_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        let loaded = manager.load_user_config().unwrap();
        assert_eq!(loaded.piclet_settings.engine_timeout, 30);
        assert!(loaded.piclet_settings.engine_path.is_empty());
    }

    #[test]
    fn test_load_save_presets_config() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = PresetsConfig {
            presets: vec![Preset {
                id: "custom".to_string(),
                name: "Custom Pack".to_string(),
                description: String::new(),
                icons: vec![IconSpec::square("icon-100.png", 100)],
            }],
        };
        manager.save_presets_config(&config).unwrap();

        let loaded = manager.load_presets_config().unwrap();
        assert_eq!(loaded.presets.len(), 1);
        assert_eq!(loaded.presets[0].id, "custom");
    }

    #[test]
    fn test_merged_presets_keeps_builtins() {
        let (manager, _temp_dir) = create_test_config_manager();

        let config = PresetsConfig {
            presets: vec![Preset {
                id: "msstore".to_string(),
                name: "Shadowed Store".to_string(),
                description: String::new(),
                icons: vec![IconSpec::square("logo.png", 50)],
            }],
        };
        manager.save_presets_config(&config).unwrap();

        let merged = manager.merged_presets().unwrap();
        // Built-in ids survive, the shadowed one carries user content
        assert!(merged.contains_key("webstore"));
        assert!(merged.contains_key("social"));
        assert_eq!(merged.get("msstore").unwrap().name, "Shadowed Store");
    }

    #[test]
    fn test_merged_presets_without_user_file() {
        let (manager, _temp_dir) = create_test_config_manager();

        let merged = manager.merged_presets().unwrap();
        assert!(merged.contains_key("msstore"));
        assert!(merged.contains_key("webstore"));
        assert!(merged.contains_key("social"));
    }
}
