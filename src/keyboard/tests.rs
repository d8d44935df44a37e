use super::lifecycle::KeyLifecycleManager;
use super::types::{TimerFired, TimerKind, SAFETY_EXPIRY};
use crate::events::EventBus;
use crate::settings::AppSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn manager() -> KeyLifecycleManager {
    KeyLifecycleManager::new(Arc::new(EventBus::new(64)), SAFETY_EXPIRY)
}

/// Let armed timer tasks reach their deadlines, then apply whatever fired.
async fn advance(manager: &mut KeyLifecycleManager, duration: Duration) {
    sleep(duration).await;
    // Yield once so timer tasks whose deadlines just elapsed get to send
    // their fired messages before the queue is drained.
    tokio::task::yield_now().await;
    manager.process_fired_timers();
}

#[tokio::test(start_paused = true)]
async fn test_press_shows_badge_immediately() {
    let mut manager = manager();
    manager.handle_key_pressed("A");

    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].key, "A");
    assert_eq!(keys[0].id, 0);
    assert!(!keys[0].fading_out);
}

#[tokio::test(start_paused = true)]
async fn test_display_ids_are_monotonic_across_keys() {
    let mut manager = manager();
    manager.handle_key_pressed("A");
    manager.handle_key_pressed("B");
    manager.handle_key_pressed("C");

    let ids: Vec<u64> = manager.visible_keys().iter().map(|k| k.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_release_fades_then_removes() {
    // Default 2000 ms fade-out: fade starts at 1700, removal lands at 2000.
    let mut manager = manager();
    manager.handle_key_pressed("A");
    manager.handle_key_released("A");

    advance(&mut manager, Duration::from_millis(1650)).await;
    assert!(!manager.visible_keys()[0].fading_out);

    advance(&mut manager, Duration::from_millis(100)).await;
    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].fading_out);

    advance(&mut manager, Duration::from_millis(300)).await;
    assert!(manager.visible_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fade_shorter_than_animation_starts_immediately() {
    let mut manager = manager();
    manager.set_fade_out(200);
    manager.handle_key_pressed("A");
    manager.handle_key_released("A");

    advance(&mut manager, Duration::from_millis(50)).await;
    assert!(manager.visible_keys()[0].fading_out);

    // The full 300 ms animation still runs before removal.
    advance(&mut manager, Duration::from_millis(200)).await;
    assert_eq!(manager.visible_keys().len(), 1);
    advance(&mut manager, Duration::from_millis(100)).await;
    assert!(manager.visible_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_capacity_evicts_oldest() {
    let mut manager = manager();
    // 400 px wide: room for five badges.
    manager.set_viewport_width(400);

    for i in 0..20 {
        manager.handle_key_pressed(&format!("K{}", i));
    }

    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 5);
    let labels: Vec<&str> = keys.iter().map(|k| k.key.as_str()).collect();
    assert_eq!(labels, vec!["K15", "K16", "K17", "K18", "K19"]);
    let ids: Vec<u64> = keys.iter().map(|k| k.id).collect();
    assert_eq!(ids, vec![15, 16, 17, 18, 19]);
}

#[tokio::test(start_paused = true)]
async fn test_width_change_applies_from_next_press() {
    let mut manager = manager();
    manager.set_viewport_width(400);
    for i in 0..5 {
        manager.handle_key_pressed(&format!("K{}", i));
    }

    // Shrinking the overlay leaves existing badges alone.
    manager.set_viewport_width(0);
    assert_eq!(manager.visible_keys().len(), 5);

    // The next press enforces the new capacity of two.
    manager.handle_key_pressed("K5");
    let labels: Vec<String> = manager
        .visible_keys()
        .iter()
        .map(|k| k.key.clone())
        .collect();
    assert_eq!(labels, vec!["K4", "K5"]);
}

#[tokio::test(start_paused = true)]
async fn test_repress_restarts_lifecycle_under_new_id() {
    let mut manager = manager();
    manager.handle_key_pressed("A");
    manager.handle_key_released("A");

    advance(&mut manager, Duration::from_millis(1900)).await;
    assert!(manager.visible_keys()[0].fading_out);

    // Re-press while fading: a fresh occurrence, fully opaque again.
    manager.handle_key_pressed("A");
    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].id, 1);
    assert!(!keys[0].fading_out);

    // The first occurrence's removal deadline passes with no effect.
    advance(&mut manager, Duration::from_millis(200)).await;
    assert_eq!(manager.visible_keys().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_timer_for_prior_occurrence_is_ignored() {
    let mut manager = manager();
    manager.handle_key_pressed("A");
    manager.handle_key_pressed("A");
    assert_eq!(manager.visible_keys()[0].id, 1);

    // A leftover deadline from the first press's bundle must not touch the
    // current occurrence.
    manager.handle_timer(TimerFired {
        key: "A".to_string(),
        bundle_id: 0,
        kind: TimerKind::Remove,
    });
    assert_eq!(manager.visible_keys().len(), 1);

    manager.handle_timer(TimerFired {
        key: "A".to_string(),
        bundle_id: 0,
        kind: TimerKind::FadeStart,
    });
    assert!(!manager.visible_keys()[0].fading_out);
}

#[tokio::test(start_paused = true)]
async fn test_release_supersedes_already_fired_safety_timer() {
    let mut manager = manager();
    manager.handle_key_pressed("A");

    // The safety deadline passes and its message is queued, but the release
    // is processed before the queue is drained.
    sleep(SAFETY_EXPIRY).await;
    manager.handle_key_released("A");
    manager.process_fired_timers();

    // The queued safety expiry belongs to the superseded press bundle and
    // must not start the fade early.
    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 1);
    assert!(!keys[0].fading_out);

    // The release's own schedule runs in full: fade at 1700, removal at 2000.
    advance(&mut manager, Duration::from_millis(1700)).await;
    assert!(manager.visible_keys()[0].fading_out);
    advance(&mut manager, Duration::from_millis(300)).await;
    assert!(manager.visible_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_release_hits_safety_expiry() {
    let mut manager = manager();
    manager.handle_key_pressed("A");

    advance(&mut manager, SAFETY_EXPIRY).await;
    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].fading_out);

    // Removal follows one animation length after the forced fade.
    advance(&mut manager, Duration::from_millis(300)).await;
    assert!(manager.visible_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repress_rearms_safety_expiry() {
    let mut manager = manager();
    manager.handle_key_pressed("A");

    advance(&mut manager, Duration::from_secs(6)).await;
    manager.handle_key_pressed("A");

    // Eleven seconds after the first press, but only five after the second:
    // the badge stays fully visible.
    advance(&mut manager, Duration::from_secs(5)).await;
    let keys = manager.visible_keys();
    assert_eq!(keys.len(), 1);
    assert!(!keys[0].fading_out);

    advance(&mut manager, Duration::from_secs(5)).await;
    assert!(manager.visible_keys()[0].fading_out);
}

#[tokio::test(start_paused = true)]
async fn test_unmatched_release_is_ignored() {
    let mut manager = manager();
    manager.handle_key_released("A");
    assert!(manager.visible_keys().is_empty());

    // Duplicate release while displayed is harmless.
    manager.handle_key_pressed("B");
    manager.handle_key_released("B");
    manager.handle_key_released("B");
    advance(&mut manager, Duration::from_millis(2100)).await;
    assert!(manager.visible_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_display_snapshot_watch() {
    let mut manager = manager();
    let receiver = manager.subscribe_display();
    assert!(receiver.borrow().is_empty());

    manager.handle_key_pressed("A");
    let snapshot = receiver.borrow();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].key, "A");
}

#[tokio::test(start_paused = true)]
async fn test_settings_push_updates_fade_and_capacity() {
    let mut manager = manager();
    let settings = AppSettings {
        keyboard_display_fade_out: 500,
        keyboard_display_width: 400,
        ..AppSettings::default()
    };
    manager.apply_settings(&settings);

    for i in 0..6 {
        manager.handle_key_pressed(&format!("K{}", i));
    }
    assert_eq!(manager.visible_keys().len(), 5);

    manager.handle_key_released("K5");
    advance(&mut manager, Duration::from_millis(250)).await;
    assert!(manager
        .visible_keys()
        .iter()
        .any(|k| k.key == "K5" && k.fading_out));

    advance(&mut manager, Duration::from_millis(300)).await;
    assert!(!manager.visible_keys().iter().any(|k| k.key == "K5"));
}
