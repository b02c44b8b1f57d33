use bevy::log::Level;
use bevy::prelude::*;
use bevy_fx_sequencer::{DEFAULT_TABLE_PATH, EffectDisplayStand, SequencerSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not write settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not serialize settings: {0}")]
    Ron(#[from] ron::Error),
}

/// Display stand placed in the showcase level
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StandSettings {
    /// Spawn the stand at all
    pub enabled: bool,
    /// Effect scenes to play, relative to `assets/`
    #[serde(default)]
    pub playlist: Vec<String>,
    /// Folder under `assets/` whose scenes are appended to the playlist
    #[serde(default)]
    pub additional_folder: Option<String>,
    /// Degrees per second
    #[serde(default)]
    pub rotate_speed: f32,
    /// Seconds per effect
    #[serde(default = "default_play_interval")]
    pub play_interval: f32,
    #[serde(default = "default_true")]
    pub auto_play: bool,
    #[serde(default = "default_true")]
    pub looping: bool,
}

fn default_play_interval() -> f32 {
    5.0
}

fn default_true() -> bool {
    true
}

impl Default for StandSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            playlist: Vec::new(),
            additional_folder: Some("effects".to_string()),
            rotate_speed: 30.0,
            play_interval: default_play_interval(),
            auto_play: true,
            looping: true,
        }
    }
}

impl StandSettings {
    pub fn to_stand(&self) -> EffectDisplayStand {
        EffectDisplayStand {
            playlist: self.playlist.clone(),
            additional_folder: self.additional_folder.clone(),
            rotate_speed: self.rotate_speed,
            play_interval: self.play_interval,
            auto_play: self.auto_play,
            looping: self.looping,
            ..default()
        }
    }
}

/// Post effect the level script plays on start
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DemoSettings {
    pub effect: String,
    /// Vector parameter given a random value on every play
    pub vector_param: String,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            effect: "flash".to_string(),
            vector_param: "Tint".to_string(),
        }
    }
}

/// Application settings that persist to disk
#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LiquidSettings {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `EnvFilter` directives applied on top of the level
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Effect table, relative to the working directory
    #[serde(default = "default_effect_table")]
    pub effect_table: String,
    /// Retries for a failed post effect load
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default)]
    pub stand: StandSettings,
    #[serde(default)]
    pub demo: DemoSettings,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_filter() -> String {
    "wgpu=error,naga=warn,bevy_fx_sequencer=debug".to_string()
}

fn default_effect_table() -> String {
    DEFAULT_TABLE_PATH.to_string()
}

fn default_retry_limit() -> u32 {
    3
}

impl Default for LiquidSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_filter: default_log_filter(),
            effect_table: default_effect_table(),
            retry_limit: default_retry_limit(),
            stand: StandSettings::default(),
            demo: DemoSettings::default(),
        }
    }
}

impl LiquidSettings {
    /// Get the settings file path
    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("liquid");
            p.push("settings.ron");
            p
        })
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::file_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Logging is not up yet when this runs, so problems fall back silently.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => ron::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::file_path() else {
            error!("Could not determine config directory");
            return;
        };
        match self.save_to(&path) {
            Ok(()) => info!("Settings saved to: {:?}", path),
            Err(e) => error!("Failed to save settings: {}", e),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn log_level(&self) -> Level {
        Level::from_str(self.log_level.trim()).unwrap_or(Level::INFO)
    }

    pub fn sequencer(&self) -> SequencerSettings {
        SequencerSettings {
            table_path: PathBuf::from(&self.effect_table),
            retry_limit: self.retry_limit,
            seed_on_startup: true,
        }
    }
}

/// Save settings whenever they are changed at runtime
pub(crate) fn save_settings_on_change(settings: Res<LiquidSettings>) {
    if settings.is_changed() && !settings.is_added() {
        settings.save();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: LiquidSettings = ron::from_str(r#"(log_level: "debug")"#).unwrap();
        assert_eq!(settings.log_level(), Level::DEBUG);
        assert_eq!(settings.effect_table, DEFAULT_TABLE_PATH);
        assert_eq!(settings.stand, StandSettings::default());
    }

    #[test]
    fn unknown_log_level_means_info() {
        let settings = LiquidSettings {
            log_level: "loud".into(),
            ..default()
        };
        assert_eq!(settings.log_level(), Level::INFO);
    }

    #[test]
    fn unreadable_file_gives_defaults() {
        let path = std::env::temp_dir().join("liquid_settings_missing/settings.ron");
        assert_eq!(LiquidSettings::load_from(&path), LiquidSettings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = std::env::temp_dir().join(format!("liquid_settings_{}", std::process::id()));
        let path = dir.join("settings.ron");
        let mut settings = LiquidSettings::default();
        settings.stand.rotate_speed = 90.0;
        settings.demo.effect = "vignette".into();

        settings.save_to(&path).unwrap();
        assert_eq!(LiquidSettings::load_from(&path), settings);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn stand_settings_map_onto_the_component() {
        let stand = StandSettings {
            playlist: vec!["effects/spark.glb".into()],
            looping: false,
            ..default()
        }
        .to_stand();
        assert_eq!(stand.playlist, vec!["effects/spark.glb".to_string()]);
        assert!(!stand.looping);
        assert_eq!(stand.play_interval, 5.0);
    }
}
