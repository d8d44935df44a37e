use super::acquire::StreamAcquisitionEngine;
use super::device::{CaptureBackend, DeviceEnumerator};
use super::quality::QualityTier;
use super::session::StreamSession;
use crate::error::{AcquireError, Result};
use crate::events::{EventBus, EventFilter, OverlayEvent};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Camera preview status for the overlay's status line. The UI maps these to
/// localized messages and decides when to offer the manual retry action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum CameraStatus {
    /// No acquisition attempted yet.
    Idle,
    /// An acquisition is in flight.
    Connecting,
    /// A live session is held.
    Connected {
        device_id: String,
        tier: Option<QualityTier>,
    },
    /// The platform has no capture subsystem.
    Unavailable,
    /// Access was refused; only a user-triggered retry makes sense.
    PermissionDenied,
    /// Terminal acquisition failure for another reason.
    Failed { message: String },
}

impl fmt::Display for CameraStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraStatus::Idle => write!(f, "idle"),
            CameraStatus::Connecting => write!(f, "connecting"),
            CameraStatus::Connected { device_id, tier } => match tier {
                Some(tier) => write!(f, "connected to {} at {}", device_id, tier),
                None => write!(f, "connected to {} at default quality", device_id),
            },
            CameraStatus::Unavailable => write!(f, "capture unavailable"),
            CameraStatus::PermissionDenied => write!(f, "permission denied"),
            CameraStatus::Failed { message } => write!(f, "failed: {}", message),
        }
    }
}

/// Owns the window's single active stream session and drives re-acquisition
/// from settings pushes.
///
/// Enforces stop-before-start: any prior session is released before a new
/// acquisition begins, so two device handles are never held at once.
pub struct PreviewController {
    engine: StreamAcquisitionEngine,
    enumerator: DeviceEnumerator,
    event_bus: Arc<EventBus>,
    session: Mutex<Option<StreamSession>>,
    selected_device: parking_lot::Mutex<Option<String>>,
    status: parking_lot::Mutex<CameraStatus>,
}

impl PreviewController {
    pub fn new(backend: Arc<dyn CaptureBackend>, event_bus: Arc<EventBus>) -> Self {
        Self {
            engine: StreamAcquisitionEngine::new(Arc::clone(&backend)),
            enumerator: DeviceEnumerator::new(backend),
            event_bus,
            session: Mutex::new(None),
            selected_device: parking_lot::Mutex::new(None),
            status: parking_lot::Mutex::new(CameraStatus::Idle),
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> CameraStatus {
        self.status.lock().clone()
    }

    /// Device id the controller is currently targeting.
    pub fn selected_device(&self) -> Option<String> {
        self.selected_device.lock().clone()
    }

    pub fn set_selected_device(&self, device_id: Option<String>) {
        *self.selected_device.lock() = device_id;
    }

    /// Whether a live session is currently held.
    pub async fn has_session(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Release any prior session, then acquire a new one for the currently
    /// selected device. Publishes status transitions for the UI.
    pub async fn attach(&self) -> Result<()> {
        // Holding the session lock across the whole attach serializes
        // concurrent re-acquisitions.
        let mut slot = self.session.lock().await;

        self.set_status(CameraStatus::Connecting).await;
        StreamAcquisitionEngine::release(&mut slot);

        let cameras = self.enumerator.list_cameras().await;
        if cameras.is_empty() {
            debug!("No camera detected during enumeration, trying acquisition anyway");
        }

        let selected = self.selected_device.lock().clone();
        match self.engine.acquire(selected.as_deref()).await {
            Ok(session) => {
                info!(
                    "Camera preview attached to {} ({} track(s))",
                    session.device_id(),
                    session.track_count()
                );
                self.set_status(CameraStatus::Connected {
                    device_id: session.device_id().to_string(),
                    tier: session.tier(),
                })
                .await;
                *slot = Some(session);
                Ok(())
            }
            Err(e) => {
                let status = match &e {
                    AcquireError::CaptureUnavailable => CameraStatus::Unavailable,
                    err if err.is_permission_denied() => CameraStatus::PermissionDenied,
                    err => CameraStatus::Failed {
                        message: err.to_string(),
                    },
                };
                warn!("Camera preview attach failed: {}", e);
                self.set_status(status).await;
                Err(e.into())
            }
        }
    }

    /// User-triggered retry after a failure or permission denial.
    pub async fn retry(&self) -> Result<()> {
        info!("Manual camera retry requested");
        self.attach().await
    }

    /// Release the active session, if any. Idempotent.
    pub async fn detach(&self) {
        let mut slot = self.session.lock().await;
        StreamAcquisitionEngine::release(&mut slot);
        self.set_status(CameraStatus::Idle).await;
    }

    /// List cameras for the settings UI.
    pub async fn list_cameras(&self) -> Vec<super::device::CameraDevice> {
        self.enumerator.list_cameras().await
    }

    /// React to a settings push: re-acquire when the selected device changed.
    pub async fn handle_settings(&self, selected_camera_id: Option<&str>) {
        let changed = {
            let mut current = self.selected_device.lock();
            if current.as_deref() != selected_camera_id {
                *current = selected_camera_id.map(str::to_string);
                true
            } else {
                false
            }
        };

        if changed {
            info!(
                "Selected camera changed to {:?}, re-acquiring",
                selected_camera_id
            );
            if let Err(e) = self.attach().await {
                error!("Re-acquisition after device change failed: {}", e);
            }
        }
    }

    /// Settings-reaction loop; runs until the token is cancelled.
    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) {
        let mut subscription = self
            .event_bus
            .subscribe(EventFilter::settings(), "camera-preview");

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Camera preview settings loop stopping");
                    break;
                }
                event = subscription.recv() => match event {
                    Ok(OverlayEvent::SettingsUpdated { settings }) => {
                        self.handle_settings(settings.selected_camera_id.as_deref())
                            .await;
                    }
                    Ok(_) => {}
                    Err(crate::error::EventBusError::Lagged { count }) => {
                        // Settings pushes carry full state, so the latest
                        // one is all that matters after a lag.
                        warn!("Camera preview missed {} settings pushes", count);
                    }
                    Err(_) => {
                        debug!("Event bus closed, camera preview loop exiting");
                        break;
                    }
                },
            }
        }

        self.detach().await;
    }

    async fn set_status(&self, status: CameraStatus) {
        *self.status.lock() = status.clone();
        if let Err(e) = self
            .event_bus
            .publish(OverlayEvent::CameraStatusChanged { status })
            .await
        {
            debug!("Camera status not broadcast: {}", e);
        }
    }
}
