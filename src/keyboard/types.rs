use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Fade-out animation length. The fade-start timer fires this long before the
/// removal timer so the badge animates out instead of vanishing.
pub const FADE_ANIM_MS: u64 = 300;

/// Rendered width of a single key badge.
pub const BADGE_WIDTH_PX: u32 = 70;

/// Horizontal padding inside the overlay container.
pub const CONTAINER_PADDING_PX: u32 = 40;

/// Fade-out duration used before the first settings push arrives.
pub const DEFAULT_FADE_OUT_MS: u64 = 2000;

/// Ceiling on how long a key may stay displayed when its release is never
/// observed (missed release events, focus loss mid-press).
pub const SAFETY_EXPIRY: Duration = Duration::from_secs(10);

/// How many key badges fit in an overlay of the given width. Never below two.
pub fn capacity_for_width(width: u32) -> usize {
    let usable = width.saturating_sub(CONTAINER_PADDING_PX);
    ((usable / BADGE_WIDTH_PX) as usize).max(2)
}

/// A key badge as the renderer sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayKeyEntry {
    /// Display label for the key ("A", "↵", "Esc", ...).
    pub key: String,
    /// Monotonic id, unique per display occurrence; re-pressing the same key
    /// yields a fresh id.
    pub id: u64,
    /// Whether the badge is currently animating out.
    pub fading_out: bool,
}

/// Which deadline a fired timer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Start the fade animation.
    FadeStart,
    /// Remove the badge entirely.
    Remove,
    /// No release ever arrived; force the fade.
    SafetyExpiry,
}

/// A timer deadline reached for one specific timer bundle of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub key: String,
    pub bundle_id: u64,
    pub kind: TimerKind,
}

/// The timer tasks armed for one phase of a key's lifecycle.
///
/// A release replaces the press bundle under the same display occurrence, so
/// every bundle carries its own generation id. Dropping or cancelling the
/// bundle aborts the tasks, but an already-fired message may still sit in the
/// timer channel; consumers must compare the fired `bundle_id` against the
/// bundle currently on record and drop stale ones.
#[derive(Debug)]
pub struct TimerBundle {
    pub display_id: u64,
    pub bundle_id: u64,
    handles: Vec<JoinHandle<()>>,
}

impl TimerBundle {
    pub fn new(display_id: u64, bundle_id: u64) -> Self {
        Self {
            display_id,
            bundle_id,
            handles: Vec::new(),
        }
    }

    pub fn push(&mut self, handle: JoinHandle<()>) {
        self.handles.push(handle);
    }

    /// Abort every pending timer task in the bundle.
    pub fn cancel(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for TimerBundle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_scales_with_width() {
        assert_eq!(capacity_for_width(800), 10);
        assert_eq!(capacity_for_width(400), 5);
        assert_eq!(capacity_for_width(1400), 19);
    }

    #[test]
    fn test_capacity_floor_is_two() {
        assert_eq!(capacity_for_width(0), 2);
        assert_eq!(capacity_for_width(40), 2);
        assert_eq!(capacity_for_width(180), 2);
    }
}
