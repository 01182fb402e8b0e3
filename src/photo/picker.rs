//! Gallery picker contract and a file-based picker.

use std::path::PathBuf;

use async_trait::async_trait;

/// Errors from reading the picked image.
#[derive(Debug, thiserror::Error)]
pub enum PickError {
    #[error("Failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Platform image picker.
#[async_trait]
pub trait PhotoPicker: Send + Sync {
    /// Let the user choose an image. `Ok(None)` means the user cancelled.
    async fn pick(&self) -> Result<Option<Vec<u8>>, PickError>;
}

/// Picker that "chooses" a preconfigured file. No path means cancel.
#[derive(Debug, Clone, Default)]
pub struct FilePicker {
    path: Option<PathBuf>,
}

impl FilePicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PhotoPicker for FilePicker {
    async fn pick(&self) -> Result<Option<Vec<u8>>, PickError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(path).await.map_err(|source| PickError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Some(bytes))
    }
}
