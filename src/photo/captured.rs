//! The photo currently held by a booth session.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Prefix for the data URL sent to the session API.
pub const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Where a photo came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSource {
    Camera,
    Gallery,
}

/// A normalized photo produced by a capture or a gallery pick.
///
/// The JPEG bytes are shared, so cloning a photo is cheap and never copies
/// the image.
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    /// Fresh unique id for every capture
    pub id: String,
    /// When the photo was taken or picked
    pub captured_at: DateTime<Utc>,
    /// Camera that produced the photo, if any
    pub camera_id: Option<String>,
    pub source: PhotoSource,
    /// Set by downstream stages once the AI result replaces this photo
    pub is_transformed: bool,
    data: Arc<Vec<u8>>,
}

impl CapturedPhoto {
    /// Wrap bytes taken from a camera.
    pub fn from_camera(data: Vec<u8>, camera_id: impl Into<String>) -> Self {
        Self::build(data, Some(camera_id.into()), PhotoSource::Camera)
    }

    /// Wrap bytes picked from the gallery.
    pub fn from_gallery(data: Vec<u8>) -> Self {
        Self::build(data, None, PhotoSource::Gallery)
    }

    fn build(data: Vec<u8>, camera_id: Option<String>, source: PhotoSource) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            captured_at: Utc::now(),
            camera_id,
            source,
            is_transformed: false,
            data: Arc::new(data),
        }
    }

    /// The normalized JPEG bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the bytes, for moving onto a worker thread.
    pub fn shared_data(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encode JPEG bytes as a base64 data URL.
///
/// Large photos take a noticeable time to encode; call this from a blocking
/// worker rather than an async task.
pub fn encode_data_url(jpeg: &[u8]) -> String {
    let mut url = String::with_capacity(JPEG_DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    url.push_str(JPEG_DATA_URL_PREFIX);
    STANDARD.encode_string(jpeg, &mut url);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_photo_gets_a_fresh_id() {
        let a = CapturedPhoto::from_camera(vec![1, 2, 3], "cam");
        let b = CapturedPhoto::from_camera(vec![1, 2, 3], "cam");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_gallery_photo_has_no_camera() {
        let photo = CapturedPhoto::from_gallery(vec![9]);
        assert_eq!(photo.source, PhotoSource::Gallery);
        assert!(photo.camera_id.is_none());
        assert!(!photo.is_transformed);
    }

    #[test]
    fn test_clone_shares_bytes() {
        let photo = CapturedPhoto::from_camera(vec![0; 64], "cam");
        let copy = photo.clone();
        assert!(Arc::ptr_eq(&photo.shared_data(), &copy.shared_data()));
        assert_eq!(copy.len(), 64);
    }

    #[test]
    fn test_encode_data_url() {
        assert_eq!(encode_data_url(b"hi"), "data:image/jpeg;base64,aGk=");
        assert_eq!(encode_data_url(b""), JPEG_DATA_URL_PREFIX);
    }
}
