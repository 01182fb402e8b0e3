//! Capture/upload orchestration.
//!
//! [`Orchestrator`] owns the booth lifecycle: camera discovery and
//! initialization, the countdown, capture or gallery pick, and the upload to
//! the active session. Everything else observes it through
//! [`OrchestrationState`] snapshots.

mod controller;
mod error;
mod settings;
mod state;

pub use controller::{Collaborators, Orchestrator};
pub use error::{ErrorKind, OrchestratorError};
pub use settings::{
    OrchestratorSettings, CAMERA_SETTLE_DELAY, CAPTURE_SETTLE_DELAY, COUNTDOWN_TICK,
    DEFAULT_CAPTURE_TIMEOUT, DEFAULT_COUNTDOWN_SECONDS,
};
pub use state::{OrchestrationState, Phase};
