use super::device::{CaptureBackend, DeviceKind, MediaTrack, RawDeviceInfo, StreamHandle};
use super::quality::StreamConstraints;
use crate::error::OpenError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Track produced by the mock backend; flips a shared flag on stop so tests
/// can verify stop-before-start ordering.
pub struct MockTrack {
    live: Arc<AtomicBool>,
}

impl MockTrack {
    fn new() -> (Self, Arc<AtomicBool>) {
        let live = Arc::new(AtomicBool::new(true));
        (
            Self {
                live: Arc::clone(&live),
            },
            live,
        )
    }
}

impl MediaTrack for MockTrack {
    fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Scripted capture backend for tests and `--mock-camera` dry runs.
///
/// Each `open` call consumes the next scripted outcome; once the script is
/// exhausted, `open` uses the default outcome. All open calls are recorded in
/// order for assertion.
pub struct MockCaptureBackend {
    available: bool,
    devices: Mutex<Vec<RawDeviceInfo>>,
    script: Mutex<VecDeque<Result<(), OpenError>>>,
    default_outcome: Mutex<Result<(), OpenError>>,
    open_calls: Mutex<Vec<StreamConstraints>>,
    issued_tracks: Mutex<Vec<Arc<AtomicBool>>>,
}

impl MockCaptureBackend {
    /// Backend with capture support and no devices; opens succeed.
    pub fn new() -> Self {
        Self {
            available: true,
            devices: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(Ok(())),
            open_calls: Mutex::new(Vec::new()),
            issued_tracks: Mutex::new(Vec::new()),
        }
    }

    /// Backend reporting no capture subsystem at all.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Backend pre-populated with one built-in camera, for dry runs.
    pub fn with_default_device() -> Self {
        let backend = Self::new();
        backend.add_video_input("mock-camera-0", "Mock Camera", Some("mock-group"));
        backend
    }

    pub fn add_video_input(&self, device_id: &str, label: &str, group_id: Option<&str>) {
        self.devices.lock().push(RawDeviceInfo {
            device_id: device_id.to_string(),
            kind: DeviceKind::VideoInput,
            label: label.to_string(),
            group_id: group_id.map(str::to_string),
        });
    }

    pub fn add_raw_device(&self, device: RawDeviceInfo) {
        self.devices.lock().push(device);
    }

    /// Queue the outcome for the next open call.
    pub fn script_open(&self, outcome: Result<(), OpenError>) {
        self.script.lock().push_back(outcome);
    }

    /// Queue `count` failing open calls with the same error.
    pub fn script_failures(&self, count: usize, error: OpenError) {
        let mut script = self.script.lock();
        for _ in 0..count {
            script.push_back(Err(error.clone()));
        }
    }

    /// Outcome used once the script is exhausted.
    pub fn set_default_outcome(&self, outcome: Result<(), OpenError>) {
        *self.default_outcome.lock() = outcome;
    }

    /// Constraints of every open call so far, in order.
    pub fn open_calls(&self) -> Vec<StreamConstraints> {
        self.open_calls.lock().clone()
    }

    pub fn open_call_count(&self) -> usize {
        self.open_calls.lock().len()
    }

    /// How many tracks handed out so far are still live.
    pub fn live_track_count(&self) -> usize {
        self.issued_tracks
            .lock()
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }

    fn resolve_device_id(&self, constraints: &StreamConstraints) -> String {
        if let Some(id) = &constraints.device_id {
            return id.clone();
        }
        self.devices
            .lock()
            .iter()
            .find(|d| d.kind == DeviceKind::VideoInput)
            .map(|d| d.device_id.clone())
            .unwrap_or_else(|| "default-camera".to_string())
    }
}

impl Default for MockCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for MockCaptureBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn enumerate(&self) -> Vec<RawDeviceInfo> {
        self.devices.lock().clone()
    }

    async fn open(&self, constraints: &StreamConstraints) -> Result<StreamHandle, OpenError> {
        self.open_calls.lock().push(constraints.clone());

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_outcome.lock().clone());

        outcome?;

        let (track, live_flag) = MockTrack::new();
        self.issued_tracks.lock().push(live_flag);

        Ok(StreamHandle {
            device_id: self.resolve_device_id(constraints),
            tier: constraints.tier,
            tracks: vec![Box::new(track)],
        })
    }
}
