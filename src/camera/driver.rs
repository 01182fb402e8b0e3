//! Camera driver contracts.
//!
//! The orchestrator only talks to cameras through [`CameraDriver`] and the
//! [`CameraHandle`] it returns. Drivers that can only select devices by exact
//! id implement [`DeviceIdDriver`] instead and are adapted with
//! [`DeviceIdCameraDriver`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::types::{CameraDescriptor, CameraError};

/// Platform camera driver.
#[async_trait]
pub trait CameraDriver: Send + Sync {
    /// List the cameras currently exposed by the platform.
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError>;

    /// Ask the OS for camera access. Drivers without a permission model
    /// succeed immediately.
    async fn request_permission(&self) -> Result<(), CameraError> {
        Ok(())
    }

    /// Open a device. The returned handle reports the device the platform
    /// actually opened, which may differ from the one requested.
    async fn open(&self, camera: &CameraDescriptor)
        -> Result<Box<dyn CameraHandle>, CameraError>;
}

/// An open camera device.
#[async_trait]
pub trait CameraHandle: Send + Sync {
    /// The device that was actually opened.
    fn descriptor(&self) -> &CameraDescriptor;

    /// Preview is running and an exposure can be taken.
    fn is_ready(&self) -> bool;

    /// Capture output is already a bounded JPEG and skips normalization.
    fn emits_normalized(&self) -> bool {
        false
    }

    /// Take one exposure and return the encoded image bytes.
    async fn capture(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Release the device. Safe to call more than once.
    async fn dispose(&mut self);
}

/// Result of initializing a device-id driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewTexture {
    /// Texture identifier the UI renders the preview from
    pub texture_id: i64,
    /// Id of the device that was actually initialized
    pub device_id: String,
}

/// Secondary driver for devices that need exact device-id selection instead
/// of direction-based matching.
#[async_trait]
pub trait DeviceIdDriver: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<CameraDescriptor>, CameraError>;
    async fn initialize(&self, device_id: &str) -> Result<PreviewTexture, CameraError>;
    async fn start_preview(&self) -> Result<(), CameraError>;
    /// Take a picture and return the path of the written JPEG.
    async fn take_picture(&self) -> Result<PathBuf, CameraError>;
    async fn dispose(&self);
}

/// Adapts a [`DeviceIdDriver`] to the [`CameraDriver`] contract.
#[derive(Clone)]
pub struct DeviceIdCameraDriver {
    inner: Arc<dyn DeviceIdDriver>,
}

impl DeviceIdCameraDriver {
    pub fn new(inner: Arc<dyn DeviceIdDriver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl CameraDriver for DeviceIdCameraDriver {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError> {
        self.inner.list_devices().await
    }

    async fn open(
        &self,
        camera: &CameraDescriptor,
    ) -> Result<Box<dyn CameraHandle>, CameraError> {
        let preview = self.inner.initialize(&camera.id).await?;
        log::info!(
            "Device-id driver initialized {} (texture {})",
            preview.device_id,
            preview.texture_id
        );

        let mut opened = camera.clone();
        opened.id = preview.device_id;

        let mut handle = DeviceIdHandle {
            driver: Arc::clone(&self.inner),
            descriptor: opened,
            texture_id: preview.texture_id,
            ready: false,
        };

        if let Err(e) = self.inner.start_preview().await {
            handle.dispose().await;
            return Err(e);
        }
        handle.ready = true;
        Ok(Box::new(handle))
    }
}

/// Handle for a device opened through a [`DeviceIdDriver`].
struct DeviceIdHandle {
    driver: Arc<dyn DeviceIdDriver>,
    descriptor: CameraDescriptor,
    texture_id: i64,
    ready: bool,
}

#[async_trait]
impl CameraHandle for DeviceIdHandle {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn emits_normalized(&self) -> bool {
        true
    }

    async fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.ready {
            return Err(CameraError::NotReady);
        }
        let path = self.driver.take_picture().await?;
        let bytes = tokio::fs::read(&path).await?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            log::debug!("Could not remove picture {}: {}", path.display(), e);
        }
        Ok(bytes)
    }

    async fn dispose(&mut self) {
        if self.ready {
            log::debug!("Disposing device-id preview texture {}", self.texture_id);
        }
        self.ready = false;
        self.driver.dispose().await;
    }
}
