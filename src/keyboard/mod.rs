mod lifecycle;
mod listener;
mod types;
#[cfg(test)]
mod tests;

pub use lifecycle::KeyLifecycleManager;
pub use listener::KeyInputListener;
pub use types::{
    capacity_for_width, DisplayKeyEntry, TimerBundle, TimerFired, TimerKind, BADGE_WIDTH_PX,
    CONTAINER_PADDING_PX, DEFAULT_FADE_OUT_MS, FADE_ANIM_MS, SAFETY_EXPIRY,
};
