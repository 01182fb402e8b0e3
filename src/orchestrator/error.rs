//! Errors recorded by the orchestrator.

use serde::Serialize;

use crate::api::ApiError;
use crate::camera::CameraError;

/// Broad class of a failure, used to pick the recovery hint shown to guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Permission,
    Device,
    Network,
    Input,
}

/// A failure stored in [`OrchestrationState::last_error`](super::OrchestrationState).
///
/// Cloneable so it can travel inside state snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Failed to enumerate cameras: {0}")]
    EnumerationFailed(String),

    #[error("No cameras available")]
    NoCameraAvailable,

    #[error("Failed to open camera: {0}")]
    CameraOpenFailed(String),

    #[error("Wrong camera selected: requested '{requested}', opened '{opened}'")]
    WrongCameraSelected { requested: String, opened: String },

    #[error("Camera is not ready")]
    CameraNotReady,

    #[error("Capture timed out")]
    CaptureTimeout,

    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Failed to load picked photo: {0}")]
    GalleryReadFailed(String),

    #[error("No photo to upload")]
    NoPhoto,

    #[error("No active session")]
    NoSession,

    #[error("Upload timed out")]
    UploadTimeout,

    #[error("API error: {0}")]
    ApiError(String),

    /// Another operation holds the camera or the upload slot. Never stored in
    /// the state.
    #[error("Busy: {0}")]
    Busy(String),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::PermissionDenied => ErrorKind::Permission,
            OrchestratorError::UploadTimeout | OrchestratorError::ApiError(_) => {
                ErrorKind::Network
            }
            OrchestratorError::GalleryReadFailed(_)
            | OrchestratorError::NoPhoto
            | OrchestratorError::NoSession
            | OrchestratorError::Busy(_) => ErrorKind::Input,
            _ => ErrorKind::Device,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            OrchestratorError::CaptureTimeout | OrchestratorError::UploadTimeout
        )
    }

    /// Text shown to the guest next to the retry button.
    ///
    /// Timeouts get their own wording so guests know whether to check the
    /// connection or just try again.
    pub fn user_message(&self) -> String {
        match self {
            OrchestratorError::PermissionDenied => {
                "Camera access is turned off. Enable it in the device settings.".to_string()
            }
            OrchestratorError::NoCameraAvailable => {
                "No camera found. Connect a camera and try again.".to_string()
            }
            OrchestratorError::WrongCameraSelected { .. } => {
                "The selected camera could not be opened. Try another camera.".to_string()
            }
            OrchestratorError::CaptureTimeout => {
                "The camera took too long to respond. Please try again.".to_string()
            }
            OrchestratorError::UploadTimeout => {
                "Upload is taking too long. Check the internet connection and try again."
                    .to_string()
            }
            OrchestratorError::ApiError(message) => {
                format!("Upload failed: {}. Please try again.", message)
            }
            OrchestratorError::NoSession => {
                "This session has expired. Please start over.".to_string()
            }
            other => format!("{}. Please try again.", other),
        }
    }

    pub(crate) fn from_open_error(error: CameraError) -> Self {
        match error {
            CameraError::PermissionDenied => OrchestratorError::PermissionDenied,
            other => OrchestratorError::CameraOpenFailed(other.to_string()),
        }
    }

    pub(crate) fn from_capture_error(error: CameraError) -> Self {
        match error {
            CameraError::NotReady => OrchestratorError::CameraNotReady,
            CameraError::PermissionDenied => OrchestratorError::PermissionDenied,
            other => OrchestratorError::CaptureFailed(other.to_string()),
        }
    }

    pub(crate) fn from_upload_error(error: ApiError) -> Self {
        match error {
            ApiError::Timeout => OrchestratorError::UploadTimeout,
            ApiError::Status { message, .. } => OrchestratorError::ApiError(message),
            other => OrchestratorError::ApiError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_have_distinct_message() {
        let timeout = OrchestratorError::UploadTimeout.user_message();
        let generic = OrchestratorError::ApiError("server error".to_string()).user_message();
        assert!(timeout.contains("connection"));
        assert_ne!(timeout, generic);
        assert!(OrchestratorError::UploadTimeout.is_timeout());
        assert!(!OrchestratorError::NoPhoto.is_timeout());
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(OrchestratorError::PermissionDenied.kind(), ErrorKind::Permission);
        assert_eq!(OrchestratorError::CaptureTimeout.kind(), ErrorKind::Device);
        assert_eq!(OrchestratorError::UploadTimeout.kind(), ErrorKind::Network);
        assert_eq!(OrchestratorError::NoSession.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_from_upload_error() {
        assert_eq!(
            OrchestratorError::from_upload_error(ApiError::Timeout),
            OrchestratorError::UploadTimeout
        );
        assert_eq!(
            OrchestratorError::from_upload_error(ApiError::Status {
                status: 422,
                message: "Image too large".to_string(),
            }),
            OrchestratorError::ApiError("Image too large".to_string())
        );
    }

    #[test]
    fn test_from_open_error() {
        assert_eq!(
            OrchestratorError::from_open_error(CameraError::PermissionDenied),
            OrchestratorError::PermissionDenied
        );
        assert!(matches!(
            OrchestratorError::from_open_error(CameraError::OpenFailed("busy".to_string())),
            OrchestratorError::CameraOpenFailed(_)
        ));
    }

    #[test]
    fn test_wrong_camera_display() {
        let error = OrchestratorError::WrongCameraSelected {
            requested: "1".to_string(),
            opened: "0".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Wrong camera selected: requested '1', opened '0'"
        );
    }
}
