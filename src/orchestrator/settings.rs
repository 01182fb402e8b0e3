//! Timing knobs for the capture/upload state machine.

use std::time::Duration;

use crate::api::DEFAULT_UPLOAD_TIMEOUT;

/// Countdown tick period.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Pause between the last countdown tick and the exposure, so the UI can
/// finish redrawing.
pub const CAPTURE_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Pause after releasing a camera before opening the next one. Opening a
/// device while the previous handle is still releasing causes native
/// contention on some platforms.
pub const CAMERA_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Upper bound for a single exposure.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default countdown length in seconds.
pub const DEFAULT_COUNTDOWN_SECONDS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub countdown_tick: Duration,
    pub capture_settle: Duration,
    pub camera_settle: Duration,
    pub capture_timeout: Duration,
    /// Covers payload encoding and the PATCH request
    pub upload_timeout: Duration,
    /// Period of the upload-elapsed ticker
    pub upload_tick: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            countdown_tick: COUNTDOWN_TICK,
            capture_settle: CAPTURE_SETTLE_DELAY,
            camera_settle: CAMERA_SETTLE_DELAY,
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
            upload_tick: Duration::from_secs(1),
        }
    }
}
