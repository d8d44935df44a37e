use crate::camera::{CaptureBackend, MockCaptureBackend, NullCaptureBackend, PreviewController};
use crate::config::FloatcamConfig;
use crate::error::{FloatcamError, Result};
use crate::events::{EventBus, EventFilter, OverlayEvent};
use crate::keyboard::{KeyInputListener, KeyLifecycleManager};
use crate::settings::{SettingsChannel, SettingsStore};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

/// Main application coordinator that wires the event bus, settings channel,
/// camera preview, and keyboard display together.
pub struct OverlayOrchestrator {
    config: FloatcamConfig,
    event_bus: Arc<EventBus>,
    settings: Arc<SettingsChannel>,
    preview: Arc<PreviewController>,

    // Components consumed on start
    lifecycle: Option<KeyLifecycleManager>,
    listener: Option<KeyInputListener>,

    // Lifecycle management
    component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    cancellation_token: CancellationToken,
}

impl OverlayOrchestrator {
    /// Create a new orchestrator with the given configuration. The capture
    /// backend is chosen from the config: the scripted mock for dry runs,
    /// otherwise whatever the host wires in via [`Self::with_backend`].
    pub fn new(config: FloatcamConfig) -> Result<Self> {
        let backend: Arc<dyn CaptureBackend> = if config.camera.mock {
            Arc::new(MockCaptureBackend::with_default_device())
        } else {
            Arc::new(NullCaptureBackend)
        };
        Self::with_backend(config, backend)
    }

    /// Create an orchestrator around a host-provided capture backend.
    pub fn with_backend(config: FloatcamConfig, backend: Arc<dyn CaptureBackend>) -> Result<Self> {
        config.validate().map_err(FloatcamError::Config)?;

        let event_bus = Arc::new(EventBus::new(config.system.event_bus_capacity));
        let store = Arc::new(SettingsStore::open(&config.system.settings_path));
        let settings = Arc::new(SettingsChannel::new(store, Arc::clone(&event_bus)));
        let preview = Arc::new(PreviewController::new(backend, Arc::clone(&event_bus)));
        let lifecycle = Some(KeyLifecycleManager::new(
            Arc::clone(&event_bus),
            Duration::from_secs(config.keyboard.safety_expiry_seconds),
        ));
        let listener = Some(KeyInputListener::new(Arc::clone(&event_bus)));
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            settings,
            preview,
            lifecycle,
            listener,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    pub fn settings(&self) -> Arc<SettingsChannel> {
        Arc::clone(&self.settings)
    }

    pub fn preview(&self) -> Arc<PreviewController> {
        Arc::clone(&self.preview)
    }

    /// Initialize all system components
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing overlay components");

        let mut states = self.component_states.lock().await;
        states.insert("preview".to_string(), ComponentState::Stopped);
        states.insert("keyboard-display".to_string(), ComponentState::Stopped);
        if self.config.keyboard.listener_enabled {
            states.insert("key-listener".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!("All components initialized");
        Ok(())
    }

    /// Start all system components
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting overlay system");

        // Key display first so it observes the initial settings push.
        self.set_component_state("keyboard-display", ComponentState::Starting)
            .await;
        let lifecycle = self
            .lifecycle
            .take()
            .ok_or_else(|| FloatcamError::system("Key lifecycle already started"))?;
        tokio::spawn(lifecycle.run(self.cancellation_token.child_token()));
        self.set_component_state("keyboard-display", ComponentState::Running)
            .await;

        self.set_component_state("preview", ComponentState::Starting)
            .await;
        tokio::spawn(
            Arc::clone(&self.preview).run(self.cancellation_token.child_token()),
        );
        self.set_component_state("preview", ComponentState::Running)
            .await;

        if self.config.keyboard.listener_enabled {
            self.set_component_state("key-listener", ComponentState::Starting)
                .await;
            if let Some(listener) = &self.listener {
                listener.start().await.map_err(|e| {
                    error!("Failed to start key input listener: {}", e);
                    e
                })?;
            }
            self.set_component_state("key-listener", ComponentState::Running)
                .await;
        }

        // Push the persisted settings so every component starts from the same
        // snapshot.
        let current = self.settings.current();
        self.preview
            .set_selected_device(current.selected_camera_id.clone());
        if let Err(e) = self
            .event_bus
            .publish(OverlayEvent::SettingsUpdated { settings: current })
            .await
        {
            debug!("Initial settings push not broadcast: {}", e);
        }

        if self.config.camera.enabled {
            // A failed attach leaves the preview in a terminal status the UI
            // can show; it does not bring the overlay down.
            if let Err(e) = self.preview.attach().await {
                warn!("Camera preview not attached at startup: {}", e);
            }
        }

        info!("Overlay system started");
        Ok(())
    }

    /// Run the main application loop with signal handling
    pub async fn run(&mut self) -> Result<i32> {
        info!("Overlay system is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| FloatcamError::system("Shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| FloatcamError::system("Shutdown receiver already taken"))?;

        self.setup_shutdown_triggers(shutdown_sender).await;

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| FloatcamError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;
        info!("Overlay system shutdown complete");
        Ok(exit_code)
    }

    /// Arm every shutdown trigger: OS signals plus bus-level shutdown events
    /// (the key listener publishes one on Ctrl+Q).
    async fn setup_shutdown_triggers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            if let Some(sender) = sender.lock().await.take() {
                                let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                            }
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        let sender = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });

        let sender = Arc::clone(&shutdown_sender);
        let mut subscription = self.event_bus.subscribe(
            EventFilter::EventTypes(vec!["shutdown_requested"]),
            "orchestrator",
        );
        tokio::spawn(async move {
            while let Ok(event) = subscription.recv().await {
                if let OverlayEvent::ShutdownRequested { reason, .. } = event {
                    info!("Shutdown requested via event bus: {}", reason);
                    if let Some(sender) = sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::UserRequest);
                    }
                    break;
                }
            }
        });
    }

    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        // Stop the listener first so the terminal is restored promptly.
        if self.config.keyboard.listener_enabled {
            self.set_component_state("key-listener", ComponentState::Stopping)
                .await;
            if let Some(listener) = &self.listener {
                if let Err(e) = listener.stop().await {
                    error!("Error stopping key input listener: {}", e);
                    self.set_component_state("key-listener", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                } else {
                    self.set_component_state("key-listener", ComponentState::Stopped)
                        .await;
                }
            }
        }

        // Cancelling the token stops the preview loop (which detaches its
        // session) and the key lifecycle loop.
        self.cancellation_token.cancel();
        self.preview.detach().await;
        self.set_component_state("preview", ComponentState::Stopped)
            .await;
        self.set_component_state("keyboard-display", ComponentState::Stopped)
            .await;

        info!("Graceful shutdown finished with exit code {}", exit_code);
        Ok(exit_code)
    }

    async fn set_component_state(&self, component: &str, state: ComponentState) {
        debug!("Component {} -> {:?}", component, state);
        self.component_states
            .lock()
            .await
            .insert(component.to_string(), state);
    }

    /// Current component states snapshot.
    pub async fn component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraStatus;
    use tempfile::tempdir;

    fn test_config(dir: &std::path::Path) -> FloatcamConfig {
        let mut config = FloatcamConfig::default();
        config.camera.mock = true;
        config.keyboard.listener_enabled = false;
        config.system.settings_path = dir
            .join("settings.json")
            .to_string_lossy()
            .into_owned();
        config
    }

    #[tokio::test]
    async fn test_startup_attaches_mock_camera() {
        let dir = tempdir().unwrap();
        let mut orchestrator = OverlayOrchestrator::new(test_config(dir.path())).unwrap();

        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();

        match orchestrator.preview().status() {
            CameraStatus::Connected { device_id, .. } => assert_eq!(device_id, "mock-camera-0"),
            other => panic!("Unexpected status: {:?}", other),
        }

        let states = orchestrator.component_states().await;
        assert_eq!(states.get("preview"), Some(&ComponentState::Running));
        assert_eq!(
            states.get("keyboard-display"),
            Some(&ComponentState::Running)
        );

        orchestrator.shutdown().await.unwrap();
        assert!(!orchestrator.preview().has_session().await);
    }

    #[tokio::test]
    async fn test_run_exits_on_shutdown_event() {
        let dir = tempdir().unwrap();
        let mut orchestrator = OverlayOrchestrator::new(test_config(dir.path())).unwrap();

        orchestrator.initialize().await.unwrap();
        orchestrator.start().await.unwrap();

        let event_bus = orchestrator.event_bus();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = event_bus
                .publish(OverlayEvent::ShutdownRequested {
                    reason: "test".to_string(),
                    timestamp: std::time::SystemTime::now(),
                })
                .await;
        });

        let exit_code = orchestrator.run().await.unwrap();
        assert_eq!(exit_code, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = FloatcamConfig::default();
        config.system.event_bus_capacity = 0;
        assert!(OverlayOrchestrator::new(config).is_err());
    }
}
