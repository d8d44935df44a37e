mod acquire;
mod controller;
mod device;
mod mock;
mod quality;
mod session;

pub use acquire::{StreamAcquisitionEngine, MAX_RETRY_ROUNDS, RETRY_BASE_DELAY};
pub use controller::{CameraStatus, PreviewController};
pub use device::{
    CameraDevice, CaptureBackend, DeviceEnumerator, DeviceKind, MediaTrack, NullCaptureBackend,
    RawDeviceInfo, StreamHandle,
};
pub use mock::{MockCaptureBackend, MockTrack};
pub use quality::{QualityTier, StreamConstraints, QUALITY_TIERS};
pub use session::StreamSession;
