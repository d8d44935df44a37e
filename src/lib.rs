pub mod camera;
pub mod config;
pub mod error;
pub mod events;
pub mod keyboard;
pub mod orchestrator;
pub mod settings;

pub use camera::{
    CameraDevice, CameraStatus, CaptureBackend, DeviceEnumerator, MediaTrack, MockCaptureBackend,
    NullCaptureBackend, PreviewController, QualityTier, StreamAcquisitionEngine, StreamConstraints,
    StreamHandle, StreamSession, QUALITY_TIERS,
};
pub use config::FloatcamConfig;
pub use error::{AcquireError, EventBusError, FloatcamError, OpenError, Result};
pub use events::{EventBus, EventFilter, OverlayEvent, Subscription};
pub use keyboard::{DisplayKeyEntry, KeyInputListener, KeyLifecycleManager};
pub use orchestrator::{ComponentState, OverlayOrchestrator, ShutdownReason};
pub use settings::{AppSettings, KeyboardDisplayStyle, SettingsChannel, SettingsStore, ShapePreset};
