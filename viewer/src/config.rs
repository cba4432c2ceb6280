//! Viewer configuration, loaded from TOML with every field defaulted.

use crate::error::ConfigError;
use crate::visualizer::cache::{StoreConfig, default_store_configs};
use crate::visualizer::canvas::rendering::Theme;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ViewerConfig {
    pub app: AppSection,
    pub timeline: TimelineSection,
    pub rows: RowsSection,
    pub rendering: RenderingSection,
    pub input: InputSection,
    /// Per-store cache settings keyed by store name.
    pub cache: BTreeMap<String, StoreConfig>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            timeline: TimelineSection::default(),
            rows: RowsSection::default(),
            rendering: RenderingSection::default(),
            input: InputSection::default(),
            cache: default_store_configs(),
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: ViewerConfig = toml::from_str(text)?;
        match config.app.get_migration_strategy() {
            MigrationStrategy::None => {}
            MigrationStrategy::Recreate => {
                return Err(ConfigError::UnsupportedVersion(config.app.version));
            }
        }

        // Stores missing from the document keep their defaults.
        for (name, store) in default_store_configs() {
            config.cache.entry(name).or_insert(store);
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

// AppSection carries the config format version so older documents can be migrated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    pub const CURRENT_VERSION: &'static str = "1.0.0";

    pub fn get_migration_strategy(&self) -> MigrationStrategy {
        match self.version.as_str() {
            "1.0.0" => MigrationStrategy::None,
            _ => MigrationStrategy::Recreate,
        }
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStrategy {
    None,
    Recreate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TimelineSection {
    pub max_zoom: f64,
    /// Multiplier applied by a single zoom-in / zoom-out step.
    pub zoom_step: f64,
    /// Fraction of the visible width moved by one keyboard pan step.
    pub pan_fraction: f64,
    /// Drags narrower than this are treated as clicks.
    pub drag_zoom_min_px: f64,
}

impl Default for TimelineSection {
    fn default() -> Self {
        Self {
            max_zoom: 1_000_000.0,
            zoom_step: 2.0,
            pan_fraction: 0.25,
            drag_zoom_min_px: 4.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RowsSection {
    pub row_height: f64,
    pub buffer_rows: usize,
    /// Unmounted rows kept around for reuse before their surfaces are destroyed.
    pub pool_capacity: usize,
}

impl Default for RowsSection {
    fn default() -> Self {
        Self {
            row_height: 24.0,
            buffer_rows: 5,
            pool_capacity: 256,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RenderingSection {
    pub theme: Theme,
    pub redraws_per_frame: usize,
    pub size_retry_attempts: u32,
    pub size_retry_base_ms: u64,
    pub fallback_width: f64,
    pub fallback_height: f64,
}

impl RenderingSection {
    pub fn size_retry_base(&self) -> Duration {
        Duration::from_millis(self.size_retry_base_ms)
    }
}

impl Default for RenderingSection {
    fn default() -> Self {
        Self {
            theme: Theme::Dark,
            redraws_per_frame: 64,
            size_retry_attempts: 5,
            size_retry_base_ms: 16,
            fallback_width: 800.0,
            fallback_height: 24.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InputSection {
    pub wheel_throttle_ms: u64,
    pub drag_throttle_ms: u64,
    pub scroll_debounce_ms: u64,
}

impl InputSection {
    pub fn wheel_throttle(&self) -> Duration {
        Duration::from_millis(self.wheel_throttle_ms)
    }

    pub fn drag_throttle(&self) -> Duration {
        Duration::from_millis(self.drag_throttle_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            wheel_throttle_ms: 16,
            drag_throttle_ms: 16,
            scroll_debounce_ms: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::cache::{EvictionPolicy, WAVEFORM_IMAGES};

    #[test]
    fn empty_document_yields_defaults() {
        let config = ViewerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = ViewerConfig::from_toml_str(
            r#"
            [rows]
            row_height = 30.0

            [cache.rendered-waveform-images]
            max_size = 8
            policy = "lru"
            "#,
        )
        .unwrap();

        assert_eq!(config.rows.row_height, 30.0);
        assert_eq!(config.rows.buffer_rows, 5);
        let images = &config.cache[WAVEFORM_IMAGES.name()];
        assert_eq!(images.max_size, 8);
        assert_eq!(images.policy, EvictionPolicy::Lru);
        assert!(config.cache.contains_key("measured-dimensions"));
    }

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(AppSection::default().get_migration_strategy(), MigrationStrategy::None);
        let error = ViewerConfig::from_toml_str("[app]\nversion = \"0.1.0\"").unwrap_err();
        assert!(matches!(error, ConfigError::UnsupportedVersion(version) if version == "0.1.0"));
    }

    #[test]
    fn default_config_round_trips() {
        let text = ViewerConfig::default().to_toml_string().unwrap();
        assert_eq!(ViewerConfig::from_toml_str(&text).unwrap(), ViewerConfig::default());
    }
}
