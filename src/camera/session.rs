use super::device::{MediaTrack, StreamHandle};
use super::quality::QualityTier;
use tracing::debug;
use uuid::Uuid;

/// An acquired live stream, bound to exactly one device and at most one
/// quality tier.
///
/// Owned exclusively by the window that acquired it. [`release`] stops every
/// track and is idempotent; dropping an unreleased session releases it as a
/// backstop, but callers are expected to release explicitly before replacing
/// a session so two device handles are never held at once.
///
/// [`release`]: StreamSession::release
pub struct StreamSession {
    id: Uuid,
    device_id: String,
    tier: Option<QualityTier>,
    tracks: Vec<Box<dyn MediaTrack>>,
    released: bool,
}

impl StreamSession {
    pub(crate) fn new(handle: StreamHandle) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            device_id: handle.device_id,
            tier: handle.tier,
            tracks: handle.tracks,
            released: false,
        };
        debug!(
            "Stream session {} opened on device {} ({})",
            session.id,
            session.device_id,
            session
                .tier
                .map(|t| t.to_string())
                .unwrap_or_else(|| "default quality".to_string())
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn tier(&self) -> Option<QualityTier> {
        self.tier
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop every track of the session. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for track in &mut self.tracks {
            track.stop();
        }
        self.released = true;
        debug!("Stream session {} released", self.id);
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("tier", &self.tier)
            .field("tracks", &self.tracks.len())
            .field("released", &self.released)
            .finish()
    }
}
