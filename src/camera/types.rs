//! Camera types and data structures.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which way a camera faces, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensDirection {
    Front,
    Back,
    External,
    Unknown,
}

impl fmt::Display for LensDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LensDirection::Front => "front",
            LensDirection::Back => "back",
            LensDirection::External => "external",
            LensDirection::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One camera exposed by the OS in a single enumeration snapshot.
///
/// Descriptors are never mutated; a fresh enumeration produces fresh
/// descriptors that supersede the previous ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Opaque platform identifier, unique within one snapshot
    pub id: String,
    /// Human-readable device name
    pub name: String,
    /// Reported lens direction
    pub lens_direction: LensDirection,
    /// Sensor orientation in degrees
    pub sensor_orientation: u32,
}

impl CameraDescriptor {
    pub fn new(id: impl Into<String>, lens_direction: LensDirection) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            lens_direction,
            sensor_orientation: 0,
        }
    }

    /// Builder-style setter for the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder-style setter for the sensor orientation.
    pub fn with_sensor_orientation(mut self, degrees: u32) -> Self {
        self.sensor_orientation = degrees;
        self
    }

    /// True when the platform reports the camera as external.
    ///
    /// This only looks at the reported direction. Use
    /// [`CameraSelector::is_external`](super::CameraSelector::is_external) for
    /// the full check that includes the id heuristic.
    pub fn is_flagged_external(&self) -> bool {
        self.lens_direction == LensDirection::External
    }

    /// Same physical device as `other`: matching id and direction.
    pub fn matches(&self, other: &CameraDescriptor) -> bool {
        self.id == other.id && self.lens_direction == other.lens_direction
    }
}

impl fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ({})", self.name, self.id, self.lens_direction)
    }
}

/// Errors reported by camera drivers.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The platform device query failed
    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),

    /// Camera access was denied by the OS
    #[error("Camera permission denied. Grant camera access in the system privacy settings")]
    PermissionDenied,

    /// Opening the device failed
    #[error("Failed to open camera: {0}")]
    OpenFailed(String),

    /// The device is not streaming a preview yet
    #[error("Camera is not ready")]
    NotReady,

    /// Taking the exposure failed
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
