//! Camera discovery and driver access.
//!
//! This module provides:
//! - Camera descriptors via [`CameraDescriptor`]
//! - The selection policy via [`CameraSelector`]
//! - Driver contracts via [`CameraDriver`] and [`DeviceIdDriver`]
//! - An FFmpeg-backed driver via [`FfmpegCameraDriver`]

mod driver;
mod ffmpeg;
mod selector;
mod types;

pub use driver::{CameraDriver, CameraHandle, DeviceIdCameraDriver, DeviceIdDriver, PreviewTexture};
pub use ffmpeg::{
    build_capture_args, classify_name, parse_avfoundation_cameras, read_v4l2_cameras,
    FfmpegCameraDriver, InputFormat,
};
pub use selector::{
    normalized_key, CameraSelector, DeviceClass, ExternalHeuristic, IdPatternHeuristic,
    SelectionError,
};
pub use types::{CameraDescriptor, CameraError, LensDirection};
