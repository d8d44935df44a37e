use thiserror::Error;

/// Failure of a single stream-open request against the capture backend.
///
/// These are the intermediate failures the acquisition engine swallows while
/// walking its fallback chain; callers only ever see the last one, attached to
/// the terminal [`AcquireError::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    #[error("Camera access denied")]
    PermissionDenied,

    #[error("No camera matches device id {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Camera device is busy: {details}")]
    DeviceBusy { details: String },

    #[error("Requested constraints could not be satisfied: {details}")]
    ConstraintsUnsatisfiable { details: String },

    #[error("Capture backend failure: {details}")]
    Backend { details: String },
}

/// Terminal outcome of a stream acquisition call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The platform has no capture subsystem at all. Surfaced immediately,
    /// never retried.
    #[error("Capture subsystem is unavailable on this platform")]
    CaptureUnavailable,

    /// Every tier, fallback, and backoff round was exhausted. Carries the most
    /// recent underlying failure.
    #[error("Stream acquisition failed after {attempts} rounds: {cause}")]
    Failed {
        attempts: u32,
        #[source]
        cause: OpenError,
    },
}

impl AcquireError {
    /// True when the terminal cause was a permission refusal, in which case
    /// the only sensible recovery is an explicit user-triggered retry.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            AcquireError::Failed {
                cause: OpenError::PermissionDenied,
                ..
            }
        )
    }
}

/// Errors from the event bus.
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Subscription lagged behind by {count} events")]
    Lagged { count: u64 },

    #[error("Event channel closed")]
    ChannelClosed,
}

#[derive(Error, Debug)]
pub enum FloatcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Camera acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl FloatcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the error is worth an automatic retry. Missing capture support
    /// and permission refusals are not: both stay failed until the
    /// environment or the user changes something.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FloatcamError::Acquire(AcquireError::CaptureUnavailable) => false,
            FloatcamError::Acquire(err) if err.is_permission_denied() => false,
            FloatcamError::Config(_) => false,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, FloatcamError>;
