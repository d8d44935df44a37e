use crate::error::Result;
use crate::events::{EventBus, EventFilter, OverlayEvent, Subscription};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shape preset for the camera overlay window. Rendering happens outside the
/// core; the store only persists the choice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ShapePreset {
    Circle,
    RoundedSquare,
    Mickey,
}

/// Visual variant of the keyboard badge strip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyboardDisplayStyle {
    Dark,
    Light,
}

/// Persisted settings shared by every overlay window.
///
/// Field names serialize camelCase to match the store file the windows read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub selected_camera_id: Option<String>,
    pub shape: ShapePreset,
    pub scale: f64,
    pub mirror: bool,
    pub always_on_top: bool,
    pub click_through: bool,
    pub locked: bool,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_keyboard_enabled")]
    pub keyboard_display_enabled: bool,
    #[serde(default = "default_keyboard_fade_out")]
    pub keyboard_display_fade_out: u64,
    #[serde(default = "default_keyboard_width")]
    pub keyboard_display_width: u32,
    #[serde(default = "default_keyboard_scale")]
    pub keyboard_display_scale: f64,
    #[serde(default = "default_keyboard_style")]
    pub keyboard_display_style: KeyboardDisplayStyle,
}

fn default_locale() -> String {
    "en".to_string()
}
fn default_keyboard_enabled() -> bool {
    true
}
fn default_keyboard_fade_out() -> u64 {
    2000
}
fn default_keyboard_width() -> u32 {
    800
}
fn default_keyboard_scale() -> f64 {
    1.0
}
fn default_keyboard_style() -> KeyboardDisplayStyle {
    KeyboardDisplayStyle::Dark
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            selected_camera_id: None,
            shape: ShapePreset::Circle,
            scale: 1.0,
            mirror: true,
            always_on_top: true,
            click_through: false,
            locked: false,
            locale: default_locale(),
            keyboard_display_enabled: default_keyboard_enabled(),
            keyboard_display_fade_out: default_keyboard_fade_out(),
            keyboard_display_width: default_keyboard_width(),
            keyboard_display_scale: default_keyboard_scale(),
            keyboard_display_style: default_keyboard_style(),
        }
    }
}

impl AppSettings {
    /// Clamp user-supplied values into their supported ranges before
    /// persisting or acting on them.
    pub fn normalized(mut self) -> Self {
        self.scale = self.scale.clamp(0.6, 1.8);
        self.keyboard_display_scale = self.keyboard_display_scale.clamp(0.5, 2.0);
        self.keyboard_display_width = self.keyboard_display_width.clamp(400, 1400);
        if self.keyboard_display_fade_out == 0 {
            self.keyboard_display_fade_out = default_keyboard_fade_out();
        }
        self
    }
}

/// JSON-file-backed settings store.
///
/// Reads fall back to defaults when the file is missing or unreadable; writes
/// go through a temp file and rename so a crash mid-write never corrupts the
/// store other windows are reading.
pub struct SettingsStore {
    path: PathBuf,
    cached: Mutex<AppSettings>,
}

impl SettingsStore {
    /// Open the store at the given path, loading the persisted settings or
    /// defaults when none exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let settings = Self::load_from(&path);
        Self {
            path,
            cached: Mutex::new(settings),
        }
    }

    fn load_from(path: &Path) -> AppSettings {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
                Ok(settings) => {
                    debug!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!(
                        "Settings file {} is unreadable ({}), using defaults",
                        path.display(),
                        e
                    );
                    AppSettings::default()
                }
            },
            Err(_) => {
                debug!(
                    "No settings file at {}, starting with defaults",
                    path.display()
                );
                AppSettings::default()
            }
        }
    }

    /// Current settings snapshot.
    pub fn read(&self) -> AppSettings {
        self.cached.lock().clone()
    }

    /// Persist new settings and update the in-memory snapshot.
    pub fn write(&self, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;

        *self.cached.lock() = settings.clone();
        debug!("Settings persisted to {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Bidirectional settings interface: reads the persisted store, writes
/// updates, and pushes change notifications onto the event bus so every
/// window reacts to edits made anywhere.
pub struct SettingsChannel {
    store: Arc<SettingsStore>,
    event_bus: Arc<EventBus>,
}

impl SettingsChannel {
    pub fn new(store: Arc<SettingsStore>, event_bus: Arc<EventBus>) -> Self {
        Self { store, event_bus }
    }

    /// Current settings snapshot.
    pub fn current(&self) -> AppSettings {
        self.store.read()
    }

    /// Normalize, persist, and broadcast new settings. Returns the normalized
    /// form that was actually stored.
    pub async fn update(&self, settings: AppSettings) -> Result<AppSettings> {
        let settings = settings.normalized();
        self.store.write(&settings)?;

        if let Err(e) = self
            .event_bus
            .publish(OverlayEvent::SettingsUpdated {
                settings: settings.clone(),
            })
            .await
        {
            // No subscriber yet is fine during startup; the store is already
            // the source of truth.
            debug!("Settings update not broadcast: {}", e);
        } else {
            info!("Settings updated and broadcast");
        }

        Ok(settings)
    }

    /// Subscribe to settings-change pushes.
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        self.event_bus.subscribe(EventFilter::settings(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::open(dir.path().join("settings.json"));
        assert_eq!(store.read(), AppSettings::default());
    }

    #[test]
    fn test_write_then_reopen_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::open(&path);
        let mut settings = AppSettings::default();
        settings.selected_camera_id = Some("cam-1".to_string());
        settings.keyboard_display_fade_out = 3500;
        store.write(&settings).unwrap();

        let reopened = SettingsStore::open(&path);
        assert_eq!(reopened.read(), settings);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::open(&path);
        assert_eq!(store.read(), AppSettings::default());
    }

    #[test]
    fn test_normalization_clamps() {
        let mut settings = AppSettings::default();
        settings.scale = 5.0;
        settings.keyboard_display_scale = 0.1;
        settings.keyboard_display_width = 100;
        settings.keyboard_display_fade_out = 0;

        let normalized = settings.normalized();
        assert_eq!(normalized.scale, 1.8);
        assert_eq!(normalized.keyboard_display_scale, 0.5);
        assert_eq!(normalized.keyboard_display_width, 400);
        assert_eq!(normalized.keyboard_display_fade_out, 2000);
    }

    #[test]
    fn test_missing_keyboard_fields_use_defaults() {
        // Older store files predate the keyboard display settings.
        let legacy = r#"{
            "selectedCameraId": null,
            "shape": "circle",
            "scale": 1.0,
            "mirror": true,
            "alwaysOnTop": true,
            "clickThrough": false,
            "locked": false
        }"#;
        let settings: AppSettings = serde_json::from_str(legacy).unwrap();
        assert!(settings.keyboard_display_enabled);
        assert_eq!(settings.keyboard_display_fade_out, 2000);
        assert_eq!(settings.keyboard_display_width, 800);
    }

    #[tokio::test]
    async fn test_channel_update_persists_and_broadcasts() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SettingsStore::open(dir.path().join("settings.json")));
        let event_bus = Arc::new(EventBus::new(16));
        let channel = SettingsChannel::new(Arc::clone(&store), Arc::clone(&event_bus));

        let mut subscription = channel.subscribe("test");

        let mut settings = AppSettings::default();
        settings.keyboard_display_width = 900;
        channel.update(settings.clone()).await.unwrap();

        assert_eq!(store.read().keyboard_display_width, 900);
        match subscription.recv().await.unwrap() {
            OverlayEvent::SettingsUpdated { settings: pushed } => {
                assert_eq!(pushed.keyboard_display_width, 900);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }
}
