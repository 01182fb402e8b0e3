//! Observable orchestration state.

use std::fmt;

use serde::Serialize;

use super::error::OrchestratorError;
use crate::camera::CameraDescriptor;

/// Lifecycle phase of a booth session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    #[default]
    Idle,
    Initializing,
    Ready,
    CountingDown,
    Capturing,
    Captured,
    Uploading,
    UploadedReady,
    Error,
}

impl Phase {
    /// Phases in which the camera must not be torn down or switched.
    pub fn blocks_camera_changes(self) -> bool {
        self == Phase::Capturing
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Initializing => "initializing",
            Phase::Ready => "ready",
            Phase::CountingDown => "counting-down",
            Phase::Capturing => "capturing",
            Phase::Captured => "captured",
            Phase::Uploading => "uploading",
            Phase::UploadedReady => "uploaded",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of the orchestrator, as seen by the UI.
///
/// `countdown_value` is only ever `Some` while `phase` is
/// [`Phase::CountingDown`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestrationState {
    pub phase: Phase,
    /// Display-ordered cameras from the last discovery
    pub available_cameras: Vec<CameraDescriptor>,
    pub current_camera: Option<CameraDescriptor>,
    pub countdown_value: Option<u32>,
    /// Seconds since the current upload started; 0 when a new one begins
    pub upload_elapsed_seconds: u64,
    pub last_error: Option<OrchestratorError>,
}

impl OrchestrationState {
    pub fn is_uploading(&self) -> bool {
        self.phase == Phase::Uploading
    }

    pub fn is_counting_down(&self) -> bool {
        self.phase == Phase::CountingDown
    }
}
