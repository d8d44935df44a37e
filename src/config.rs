use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Runtime configuration for the overlay process.
///
/// Distinct from the persisted [`AppSettings`](crate::settings::AppSettings)
/// store: this file configures how the process runs, the store holds what the
/// user chose in the settings window.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FloatcamConfig {
    pub camera: CameraConfig,
    pub keyboard: KeyboardConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Whether the camera preview should be brought up at startup.
    #[serde(default = "default_camera_enabled")]
    pub enabled: bool,

    /// Use the scripted mock backend instead of a host-provided one.
    #[serde(default = "default_camera_mock")]
    pub mock: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeyboardConfig {
    /// Whether the terminal key-event listener runs.
    #[serde(default = "default_listener_enabled")]
    pub listener_enabled: bool,

    /// Safety window after which a key with no release event is forced out.
    #[serde(default = "default_safety_expiry_seconds")]
    pub safety_expiry_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity.
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Path of the shared JSON settings store.
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
}

impl FloatcamConfig {
    /// Load configuration from default sources (file + environment variables).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("floatcam.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.enabled", default_camera_enabled())?
            .set_default("camera.mock", default_camera_mock())?
            .set_default("keyboard.listener_enabled", default_listener_enabled())?
            .set_default(
                "keyboard.safety_expiry_seconds",
                default_safety_expiry_seconds(),
            )?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.settings_path", default_settings_path())?
            // Configuration file is optional
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables with FLOATCAM_ prefix
            .add_source(Environment::with_prefix("FLOATCAM").separator("_"))
            .build()?;

        let config: FloatcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.keyboard.safety_expiry_seconds == 0 {
            return Err(ConfigError::Message(
                "Keyboard safety_expiry_seconds must be greater than 0".to_string(),
            ));
        }

        if self.system.settings_path.is_empty() {
            return Err(ConfigError::Message(
                "Settings path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FloatcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                enabled: default_camera_enabled(),
                mock: default_camera_mock(),
            },
            keyboard: KeyboardConfig {
                listener_enabled: default_listener_enabled(),
                safety_expiry_seconds: default_safety_expiry_seconds(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                settings_path: default_settings_path(),
            },
        }
    }
}

// Default value functions
fn default_camera_enabled() -> bool {
    true
}
fn default_camera_mock() -> bool {
    false
}
fn default_listener_enabled() -> bool {
    true
}
fn default_safety_expiry_seconds() -> u64 {
    10
}
fn default_event_bus_capacity() -> usize {
    256
}
fn default_settings_path() -> String {
    "./settings.json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FloatcamConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.camera.enabled);
        assert!(!config.camera.mock);
        assert_eq!(config.keyboard.safety_expiry_seconds, 10);
    }

    #[test]
    fn test_config_validation_rejects_zero_capacity() {
        let mut config = FloatcamConfig::default();
        config.system.event_bus_capacity = 0;
        assert!(config.validate().is_err());

        config.system.event_bus_capacity = 64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_zero_safety_window() {
        let mut config = FloatcamConfig::default();
        config.keyboard.safety_expiry_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = FloatcamConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(
            config.system.event_bus_capacity,
            default_event_bus_capacity()
        );
    }
}
