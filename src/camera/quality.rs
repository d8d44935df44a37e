use serde::{Deserialize, Serialize};
use std::fmt;

/// A capture-constraint preset (resolution and frame rate).
///
/// Tiers are tried most demanding first; drivers commonly reject the high
/// tiers transiently, which is why relaxation is built into acquisition
/// instead of being the caller's problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTier {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}fps", self.width, self.height, self.frame_rate)
    }
}

/// Static, process-wide tier ladder, never mutated.
pub const QUALITY_TIERS: [QualityTier; 3] = [
    QualityTier {
        width: 1920,
        height: 1080,
        frame_rate: 30,
    },
    QualityTier {
        width: 1280,
        height: 720,
        frame_rate: 30,
    },
    QualityTier {
        width: 854,
        height: 480,
        frame_rate: 30,
    },
];

/// Constraints for a single stream-open request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    /// Exact device requirement; `None` lets the backend pick any camera.
    pub device_id: Option<String>,
    /// Resolution/frame-rate preset; `None` means backend default.
    pub tier: Option<QualityTier>,
}

impl StreamConstraints {
    /// Tier constraint merged with an exact-device constraint when given.
    pub fn tier_with_device(tier: QualityTier, device_id: Option<&str>) -> Self {
        Self {
            device_id: device_id.map(str::to_string),
            tier: Some(tier),
        }
    }

    /// Exact device, no resolution or frame-rate requirement.
    pub fn exact_device(device_id: &str) -> Self {
        Self {
            device_id: Some(device_id.to_string()),
            tier: None,
        }
    }

    /// Any camera, default resolution. The last-resort request.
    pub fn unconstrained() -> Self {
        Self::default()
    }
}

impl fmt::Display for StreamConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.device_id, &self.tier) {
            (Some(id), Some(tier)) => write!(f, "device={} {}", id, tier),
            (Some(id), None) => write!(f, "device={} default", id),
            (None, Some(tier)) => write!(f, "any-device {}", tier),
            (None, None) => write!(f, "unconstrained"),
        }
    }
}
