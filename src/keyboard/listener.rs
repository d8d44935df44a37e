use crate::error::Result;
use crate::events::{EventBus, OverlayEvent};
use crossterm::event::{
    self, Event, KeyCode, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal stand-in for the host's global key event tap.
///
/// Reads key presses and releases from the controlling terminal in raw mode
/// and republishes them as overlay events. Release reporting needs the kitty
/// keyboard protocol; terminals without it deliver presses only, and badges
/// then live until their safety expiry.
pub struct KeyInputListener {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

impl KeyInputListener {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for key input. Ctrl+Q requests shutdown.
    pub async fn start(&self) -> Result<()> {
        info!("Starting key input listener - Ctrl+Q to quit");

        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();
        let runtime_handle = Handle::current();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for key input: {}", e);
                publish_from_blocking(
                    &runtime_handle,
                    &event_bus,
                    OverlayEvent::EventTapStatus { active: false },
                );
                return;
            }

            // Without release reporting the overlay still works, badges just
            // ride out their safety expiry instead of fading on release.
            let enhanced = execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )
            .is_ok();
            if !enhanced {
                warn!("Terminal does not report key releases; relying on safety expiry");
            }

            publish_from_blocking(
                &runtime_handle,
                &event_bus,
                OverlayEvent::EventTapStatus { active: true },
            );
            info!("Raw mode enabled - key input listener active");

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Key input listener stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        if let Ok(Event::Key(key_event)) = event::read() {
                            if key_event.code == KeyCode::Char('q')
                                && key_event.modifiers.contains(KeyModifiers::CONTROL)
                                && key_event.kind == KeyEventKind::Press
                            {
                                info!("Ctrl+Q pressed - requesting shutdown");
                                publish_from_blocking(
                                    &runtime_handle,
                                    &event_bus,
                                    OverlayEvent::ShutdownRequested {
                                        reason: "User requested via keyboard".to_string(),
                                        timestamp: SystemTime::now(),
                                    },
                                );
                                break;
                            }

                            let Some(key) = display_label(key_event.code) else {
                                debug!("Unmapped key: {:?}", key_event.code);
                                continue;
                            };
                            let modifiers = modifier_labels(key_event.modifiers);
                            let timestamp = now_millis();

                            let overlay_event = match key_event.kind {
                                // A repeat is a fresh press for display
                                // purposes; the badge lifecycle restarts.
                                KeyEventKind::Press | KeyEventKind::Repeat => {
                                    OverlayEvent::KeyPressed {
                                        key,
                                        modifiers,
                                        timestamp,
                                    }
                                }
                                KeyEventKind::Release => OverlayEvent::KeyReleased {
                                    key,
                                    modifiers,
                                    timestamp,
                                },
                            };
                            publish_from_blocking(&runtime_handle, &event_bus, overlay_event);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for key events: {}", e);
                    }
                }
            }

            if enhanced {
                let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
            }
            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            } else {
                debug!("Raw mode disabled");
            }

            publish_from_blocking(
                &runtime_handle,
                &event_bus,
                OverlayEvent::EventTapStatus { active: false },
            );
            debug!("Key input listener task exited");
        });

        Ok(())
    }

    /// Stop the listener and restore the terminal.
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping key input listener");
        self.cancellation_token.cancel();

        // Give the task a moment to clean up and disable raw mode
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Ensure raw mode is disabled even if the task didn't clean up properly
        let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        let _ = disable_raw_mode();

        Ok(())
    }
}

fn publish_from_blocking(handle: &Handle, event_bus: &Arc<EventBus>, event: OverlayEvent) {
    let event_bus = Arc::clone(event_bus);
    handle.spawn(async move {
        if let Err(e) = event_bus.publish(event).await {
            debug!("Key event not broadcast: {}", e);
        }
    });
}

/// Map a key code to the overlay's badge label.
fn display_label(code: KeyCode) -> Option<String> {
    let label = match code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_uppercase().to_string(),
        KeyCode::Enter => "↵".to_string(),
        KeyCode::Backspace => "⌫".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Left => "←".to_string(),
        KeyCode::Right => "→".to_string(),
        KeyCode::Up => "↑".to_string(),
        KeyCode::Down => "↓".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PgUp".to_string(),
        KeyCode::PageDown => "PgDn".to_string(),
        KeyCode::Delete => "Del".to_string(),
        KeyCode::F(n) => format!("F{}", n),
        _ => return None,
    };
    Some(label)
}

fn modifier_labels(modifiers: KeyModifiers) -> Vec<String> {
    let mut labels = Vec::new();
    if modifiers.contains(KeyModifiers::SHIFT) {
        labels.push("Shift".to_string());
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        labels.push("Ctrl".to_string());
    }
    if modifiers.contains(KeyModifiers::ALT) {
        labels.push("Alt".to_string());
    }
    if modifiers.contains(KeyModifiers::SUPER) {
        labels.push("Super".to_string());
    }
    labels
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_creation() {
        let event_bus = Arc::new(EventBus::new(100));
        let listener = KeyInputListener::new(event_bus);
        assert!(!listener.cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn test_listener_stop() {
        let event_bus = Arc::new(EventBus::new(100));
        let listener = KeyInputListener::new(event_bus);

        listener.stop().await.unwrap();
        assert!(listener.cancellation_token.is_cancelled());
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(display_label(KeyCode::Char('a')).as_deref(), Some("A"));
        assert_eq!(display_label(KeyCode::Char(' ')).as_deref(), Some("Space"));
        assert_eq!(display_label(KeyCode::Enter).as_deref(), Some("↵"));
        assert_eq!(display_label(KeyCode::Backspace).as_deref(), Some("⌫"));
        assert_eq!(display_label(KeyCode::F(5)).as_deref(), Some("F5"));
        assert_eq!(display_label(KeyCode::CapsLock), None);
    }

    #[test]
    fn test_modifier_labels() {
        let labels = modifier_labels(KeyModifiers::SHIFT | KeyModifiers::CONTROL);
        assert_eq!(labels, vec!["Shift".to_string(), "Ctrl".to_string()]);
        assert!(modifier_labels(KeyModifiers::NONE).is_empty());
    }
}
