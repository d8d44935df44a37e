use super::quality::StreamConstraints;
use crate::error::OpenError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A camera input as presented to the UI and the settings store.
///
/// Identity is stable within a session; re-enumeration produces a fresh set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CameraDevice {
    pub device_id: String,
    pub label: String,
    pub group_id: Option<String>,
}

/// Device kinds reported by the platform; only video inputs become cameras.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// Raw platform device entry, before filtering and labeling.
#[derive(Debug, Clone)]
pub struct RawDeviceInfo {
    pub device_id: String,
    pub kind: DeviceKind,
    /// May be empty before the user has granted camera permission.
    pub label: String,
    pub group_id: Option<String>,
}

/// A single live track within an acquired stream.
pub trait MediaTrack: Send + Sync {
    /// Stop the track. Must be idempotent.
    fn stop(&mut self);

    /// Whether the track is still delivering media.
    fn is_live(&self) -> bool;
}

/// Raw parts of a successfully opened stream, wrapped into a
/// [`StreamSession`](super::StreamSession) by the acquisition engine.
pub struct StreamHandle {
    /// Device the backend actually opened (may differ from the request when
    /// the request was unconstrained).
    pub device_id: String,
    /// Tier the stream was granted under, when one was requested.
    pub tier: Option<super::quality::QualityTier>,
    pub tracks: Vec<Box<dyn MediaTrack>>,
}

/// Collaborator contract for the platform device/stream boundary.
///
/// Implementations live in the embedding host; this crate ships only the
/// scripted mock and the null backend.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Whether the platform exposes a capture subsystem at all.
    fn is_available(&self) -> bool;

    /// List all media devices the platform knows about.
    async fn enumerate(&self) -> Vec<RawDeviceInfo>;

    /// Open a live stream satisfying the constraints.
    async fn open(&self, constraints: &StreamConstraints) -> Result<StreamHandle, OpenError>;
}

/// Backend used when the embedding host has not wired a platform backend.
/// Reports the capture subsystem as absent.
pub struct NullCaptureBackend;

#[async_trait]
impl CaptureBackend for NullCaptureBackend {
    fn is_available(&self) -> bool {
        false
    }

    async fn enumerate(&self) -> Vec<RawDeviceInfo> {
        Vec::new()
    }

    async fn open(&self, _constraints: &StreamConstraints) -> Result<StreamHandle, OpenError> {
        Err(OpenError::Backend {
            details: "no capture backend wired".to_string(),
        })
    }
}

/// Pure query over the capture backend's device list.
pub struct DeviceEnumerator {
    backend: Arc<dyn CaptureBackend>,
}

impl DeviceEnumerator {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// List available cameras.
    ///
    /// Returns an empty list (never an error) when the capture subsystem is
    /// unavailable. Platform entries are filtered to video inputs; devices
    /// whose label the platform withholds pre-permission get a synthetic
    /// `Camera N` label in enumeration order.
    pub async fn list_cameras(&self) -> Vec<CameraDevice> {
        if !self.backend.is_available() {
            debug!("Capture subsystem unavailable, no cameras to list");
            return Vec::new();
        }

        let cameras: Vec<CameraDevice> = self
            .backend
            .enumerate()
            .await
            .into_iter()
            .filter(|device| device.kind == DeviceKind::VideoInput)
            .enumerate()
            .map(|(index, device)| CameraDevice {
                device_id: device.device_id,
                label: if device.label.is_empty() {
                    format!("Camera {}", index + 1)
                } else {
                    device.label
                },
                group_id: device.group_id.filter(|group| !group.is_empty()),
            })
            .collect();

        debug!("Enumerated {} camera(s)", cameras.len());
        cameras
    }
}
