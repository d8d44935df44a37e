use super::types::{
    capacity_for_width, DisplayKeyEntry, TimerBundle, TimerFired, TimerKind, DEFAULT_FADE_OUT_MS,
    FADE_ANIM_MS,
};
use crate::events::{EventBus, EventFilter, OverlayEvent};
use crate::settings::AppSettings;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Drives the lifecycle of every key badge in the overlay.
///
/// Each press creates a display occurrence with a fresh monotonic id; the
/// release arms the fade countdown; a safety timer bounds how long a badge can
/// linger when the release is never observed. Renderers watch the display
/// snapshot channel and draw whatever the latest snapshot says.
pub struct KeyLifecycleManager {
    event_bus: Arc<EventBus>,
    /// Oldest first. Eviction always takes the front.
    entries: Vec<DisplayKeyEntry>,
    /// Live timer bundle per key label. A key has at most one bundle, always
    /// belonging to its most recent display occurrence.
    timers: HashMap<String, TimerBundle>,
    next_display_id: u64,
    next_bundle_id: u64,
    fade_out_ms: u64,
    capacity: usize,
    safety_expiry: Duration,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    timer_rx: Option<mpsc::UnboundedReceiver<TimerFired>>,
    display_tx: watch::Sender<Vec<DisplayKeyEntry>>,
}

impl KeyLifecycleManager {
    pub fn new(event_bus: Arc<EventBus>, safety_expiry: Duration) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (display_tx, _) = watch::channel(Vec::new());
        Self {
            event_bus,
            entries: Vec::new(),
            timers: HashMap::new(),
            next_display_id: 0,
            next_bundle_id: 0,
            fade_out_ms: DEFAULT_FADE_OUT_MS,
            capacity: capacity_for_width(AppSettings::default().keyboard_display_width),
            safety_expiry,
            timer_tx,
            timer_rx: Some(timer_rx),
            display_tx,
        }
    }

    /// Current badges, oldest first.
    pub fn visible_keys(&self) -> Vec<DisplayKeyEntry> {
        self.entries.clone()
    }

    /// Watch the display snapshot; the renderer redraws on every change.
    pub fn subscribe_display(&self) -> watch::Receiver<Vec<DisplayKeyEntry>> {
        self.display_tx.subscribe()
    }

    /// Set the fade-out duration for future releases.
    pub fn set_fade_out(&mut self, fade_out_ms: u64) {
        self.fade_out_ms = fade_out_ms;
    }

    /// Recompute capacity from the overlay width. Existing badges are left
    /// alone; the new capacity applies from the next press.
    pub fn set_viewport_width(&mut self, width: u32) {
        self.capacity = capacity_for_width(width);
    }

    pub fn apply_settings(&mut self, settings: &AppSettings) {
        self.set_fade_out(settings.keyboard_display_fade_out);
        self.set_viewport_width(settings.keyboard_display_width);
    }

    /// A key went down. Creates a fresh display occurrence, replacing any
    /// prior occurrence of the same key, and arms its safety timer.
    pub fn handle_key_pressed(&mut self, key: &str) {
        let display_id = self.next_display_id;
        self.next_display_id += 1;

        // A re-press of a displayed key restarts its lifecycle under a new id.
        // The old bundle is cancelled; anything it already fired is stale.
        self.entries.retain(|entry| entry.key != key);
        if let Some(mut old) = self.timers.remove(key) {
            old.cancel();
        }

        self.entries.push(DisplayKeyEntry {
            key: key.to_string(),
            id: display_id,
            fading_out: false,
        });

        while self.entries.len() > self.capacity {
            let evicted = self.entries.remove(0);
            if let Some(mut bundle) = self.timers.remove(&evicted.key) {
                bundle.cancel();
            }
            trace!("Evicted key badge {} over capacity", evicted.key);
        }

        let bundle_id = self.next_bundle_id;
        self.next_bundle_id += 1;
        let mut bundle = TimerBundle::new(display_id, bundle_id);
        bundle.push(self.arm_timer(key, bundle_id, TimerKind::SafetyExpiry, self.safety_expiry));
        self.timers.insert(key.to_string(), bundle);

        self.publish_snapshot();
    }

    /// A key came up. Arms the fade countdown for its current occurrence,
    /// superseding the safety-expiry timer. Releases with no matching badge
    /// (already evicted, never seen pressed) are ignored.
    pub fn handle_key_released(&mut self, key: &str) {
        let Some(display_id) = self.timers.get(key).map(|b| b.display_id) else {
            debug!("Release for key {} with no displayed badge, ignoring", key);
            return;
        };

        // A fresh bundle generation. The safety-expiry task may already have
        // fired into the timer channel; its message carries the old bundle id
        // and is dropped on arrival.
        let bundle_id = self.next_bundle_id;
        self.next_bundle_id += 1;

        // Fade runs its full animation even when the fade-out duration is
        // shorter than the animation itself.
        let fade_start_ms = self.fade_out_ms.saturating_sub(FADE_ANIM_MS);
        let remove_ms = fade_start_ms + FADE_ANIM_MS;
        let fade_handle = self.arm_timer(
            key,
            bundle_id,
            TimerKind::FadeStart,
            Duration::from_millis(fade_start_ms),
        );
        let remove_handle = self.arm_timer(
            key,
            bundle_id,
            TimerKind::Remove,
            Duration::from_millis(remove_ms),
        );

        if let Some(mut old) = self.timers.remove(key) {
            old.cancel();
        }
        let mut bundle = TimerBundle::new(display_id, bundle_id);
        bundle.push(fade_handle);
        bundle.push(remove_handle);
        self.timers.insert(key.to_string(), bundle);
    }

    /// Apply one fired timer deadline.
    ///
    /// A fired message is only honored when the key still has a bundle and the
    /// bundle is the same generation that armed the timer. Everything else is
    /// a stale leftover from a superseded bundle (re-press, or a release that
    /// replaced the press bundle) and must not touch the current lifecycle.
    pub fn handle_timer(&mut self, fired: TimerFired) {
        let current = self.timers.get(&fired.key).map(|b| b.bundle_id);
        if current != Some(fired.bundle_id) {
            trace!(
                "Stale {:?} timer for key {} (bundle {})",
                fired.kind,
                fired.key,
                fired.bundle_id
            );
            return;
        }

        match fired.kind {
            TimerKind::FadeStart => {
                self.mark_fading(&fired.key);
            }
            TimerKind::SafetyExpiry => {
                // Treated like a fade start, with removal following one
                // animation length later.
                debug!("Safety expiry for key {}, forcing fade", fired.key);
                self.mark_fading(&fired.key);
                let handle = self.arm_timer(
                    &fired.key,
                    fired.bundle_id,
                    TimerKind::Remove,
                    Duration::from_millis(FADE_ANIM_MS),
                );
                if let Some(bundle) = self.timers.get_mut(&fired.key) {
                    bundle.push(handle);
                }
            }
            TimerKind::Remove => {
                self.entries.retain(|entry| entry.key != fired.key);
                if let Some(mut bundle) = self.timers.remove(&fired.key) {
                    bundle.cancel();
                }
                self.publish_snapshot();
            }
        }
    }

    fn mark_fading(&mut self, key: &str) {
        let mut changed = false;
        for entry in &mut self.entries {
            if entry.key == key && !entry.fading_out {
                entry.fading_out = true;
                changed = true;
            }
        }
        if changed {
            self.publish_snapshot();
        }
    }

    fn arm_timer(
        &self,
        key: &str,
        bundle_id: u64,
        kind: TimerKind,
        delay: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let tx = self.timer_tx.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired {
                key,
                bundle_id,
                kind,
            });
        })
    }

    fn publish_snapshot(&self) {
        let _ = self.display_tx.send(self.entries.clone());
    }

    /// Apply every timer deadline that has already fired.
    #[cfg(test)]
    pub(crate) fn process_fired_timers(&mut self) {
        let mut fired = Vec::new();
        if let Some(rx) = self.timer_rx.as_mut() {
            while let Ok(message) = rx.try_recv() {
                fired.push(message);
            }
        }
        for message in fired {
            self.handle_timer(message);
        }
    }

    /// Event loop: consumes key events and settings pushes from the bus plus
    /// fired timers, until the token is cancelled.
    pub async fn run(mut self, cancellation_token: CancellationToken) {
        let mut subscription = self.event_bus.subscribe(
            EventFilter::EventTypes(vec!["key_pressed", "key_released", "settings_updated"]),
            "key-lifecycle",
        );
        let Some(mut timer_rx) = self.timer_rx.take() else {
            warn!("Key lifecycle timer channel already taken, not starting");
            return;
        };

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Key lifecycle loop stopping");
                    break;
                }
                fired = timer_rx.recv() => {
                    if let Some(fired) = fired {
                        self.handle_timer(fired);
                    }
                }
                event = subscription.recv() => match event {
                    Ok(OverlayEvent::KeyPressed { key, .. }) => {
                        self.handle_key_pressed(&key);
                    }
                    Ok(OverlayEvent::KeyReleased { key, .. }) => {
                        self.handle_key_released(&key);
                    }
                    Ok(OverlayEvent::SettingsUpdated { settings }) => {
                        self.apply_settings(&settings);
                    }
                    Ok(_) => {}
                    Err(crate::error::EventBusError::Lagged { count }) => {
                        warn!("Key lifecycle missed {} events", count);
                    }
                    Err(_) => {
                        debug!("Event bus closed, key lifecycle loop exiting");
                        break;
                    }
                },
            }
        }
    }
}
