use super::device::{CaptureBackend, StreamHandle};
use super::quality::{StreamConstraints, QUALITY_TIERS};
use super::session::StreamSession;
use crate::error::{AcquireError, OpenError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Number of backoff rounds after the initial one. Waits are
/// 350, 700, and 1400 ms; a failure after the last round surfaces with no
/// further wait.
pub const MAX_RETRY_ROUNDS: u32 = 3;

/// Base delay for the exponential backoff between rounds.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(350);

/// Obtains a live stream for a requested device across flaky hardware,
/// drivers, and permission states.
///
/// One `acquire` call walks a strict fallback chain per round: every quality
/// tier merged with the exact-device constraint, then the exact device with
/// no tier, then fully unconstrained. Intra-round failures are swallowed;
/// failed rounds are separated by exponential backoff; only the terminal
/// outcome is reported.
pub struct StreamAcquisitionEngine {
    backend: Arc<dyn CaptureBackend>,
}

impl StreamAcquisitionEngine {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self { backend }
    }

    /// Acquire a stream, preferring `device_id` when given.
    ///
    /// Fails immediately with [`AcquireError::CaptureUnavailable`] when the
    /// platform has no capture subsystem, and with [`AcquireError::Failed`]
    /// carrying the most recent underlying cause once every tier, fallback,
    /// and backoff round is exhausted. Tier attempts are strictly sequential
    /// so multiple device opens are never in flight at once.
    pub async fn acquire(&self, device_id: Option<&str>) -> Result<StreamSession, AcquireError> {
        if !self.backend.is_available() {
            warn!("Capture subsystem unavailable, cannot acquire stream");
            return Err(AcquireError::CaptureUnavailable);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.run_round(device_id).await {
                Ok(handle) => {
                    let session = StreamSession::new(handle);
                    info!(
                        "Acquired stream on device {} (round {})",
                        session.device_id(),
                        attempt + 1
                    );
                    return Ok(session);
                }
                Err(cause) => {
                    if attempt >= MAX_RETRY_ROUNDS {
                        warn!(
                            "Stream acquisition exhausted after {} rounds: {}",
                            attempt + 1,
                            cause
                        );
                        return Err(AcquireError::Failed {
                            attempts: attempt + 1,
                            cause,
                        });
                    }

                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    debug!(
                        "Acquisition round {} failed ({}), backing off {:?}",
                        attempt + 1,
                        cause,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One full pass over the fallback chain. Returns the first success or
    /// the last failure.
    async fn run_round(&self, device_id: Option<&str>) -> Result<StreamHandle, OpenError> {
        let mut last_error: Option<OpenError> = None;

        // 1) Each quality tier, most demanding first, with the exact-device
        //    constraint merged in when a device was requested.
        for tier in QUALITY_TIERS {
            let constraints = StreamConstraints::tier_with_device(tier, device_id);
            match self.backend.open(&constraints).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    debug!("Open failed for {}: {}", constraints, e);
                    last_error = Some(e);
                }
            }
        }

        // 2) Exact device only, letting the driver pick resolution.
        if let Some(id) = device_id {
            let constraints = StreamConstraints::exact_device(id);
            match self.backend.open(&constraints).await {
                Ok(handle) => return Ok(handle),
                Err(e) => {
                    debug!("Open failed for {}: {}", constraints, e);
                    last_error = Some(e);
                }
            }
        }

        // 3) Last resort: any camera, default resolution.
        let constraints = StreamConstraints::unconstrained();
        match self.backend.open(&constraints).await {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                debug!("Open failed for {}: {}", constraints, e);
                last_error = Some(e);
            }
        }

        // The unconstrained attempt always runs, so a failed round always has
        // a cause recorded.
        Err(last_error.unwrap_or_else(|| OpenError::Backend {
            details: "no open attempt recorded".to_string(),
        }))
    }

    /// Release an active session slot, stopping all of its tracks. Safe to
    /// call when no session is held, and safe to call twice.
    pub fn release(session: &mut Option<StreamSession>) {
        if let Some(mut active) = session.take() {
            active.release();
        }
    }
}
