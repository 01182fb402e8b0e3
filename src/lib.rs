//! photobooth library crate.
//!
//! Camera discovery and selection, the capture/upload orchestrator, the photo
//! pipeline and the session API client. The `photobooth` binary is a thin
//! CLI over these modules.

pub mod api;
pub mod camera;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod photo;
