//! PhotoCache - disk cache for normalized booth photos.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::captured::CapturedPhoto;

const PHOTO_EXTENSION: &str = "jpg";

/// Disk cache of normalized JPEGs, keyed by content hash.
#[derive(Debug, Clone)]
pub struct PhotoCache {
    cache_dir: PathBuf,
}

impl PhotoCache {
    /// Create a PhotoCache with the given cache directory.
    /// Does not create the directory - call `ensure_dir_exists()` to create it.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Default: ~/.cache/photobooth/photos/
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("photobooth")
            .join("photos")
    }

    /// Create a PhotoCache with a custom directory and ensure it exists.
    pub fn new_initialized(cache_dir: PathBuf) -> Result<Self, std::io::Error> {
        let cache = Self::new(cache_dir);
        cache.ensure_dir_exists()?;
        Ok(cache)
    }

    pub fn ensure_dir_exists(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.cache_dir)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic 32-character hex key (first 16 bytes of SHA256).
    pub fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    fn path_for(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", hash, PHOTO_EXTENSION))
    }

    /// Get a cached photo path by hash, if it exists.
    pub fn get(&self, hash: &str) -> Option<PathBuf> {
        let path = self.path_for(hash);
        path.exists().then_some(path)
    }

    /// Write the photo's bytes. Identical photos share one file.
    pub fn store(&self, photo: &CapturedPhoto) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.path_for(&Self::hash_bytes(photo.data()));
        if !path.exists() {
            std::fs::write(&path, photo.data())?;
        }
        Ok(path)
    }

    /// Store and then trim the cache to `max_size_mb`.
    pub fn store_with_cleanup(
        &self,
        photo: &CapturedPhoto,
        max_size_mb: u64,
    ) -> Result<PathBuf, std::io::Error> {
        let path = self.store(photo)?;
        self.cleanup_if_needed(max_size_mb)?;
        Ok(path)
    }

    fn photo_files(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>, std::io::Error> {
        let mut files = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(files);
        }

        for entry in std::fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PHOTO_EXTENSION) {
                continue;
            }
            let metadata = entry.metadata()?;
            if metadata.is_file() {
                files.push((path, metadata));
            }
        }
        Ok(files)
    }

    /// Delete oldest photos (by modification time) until under `max_size_mb`.
    pub fn cleanup_if_needed(&self, max_size_mb: u64) -> Result<(), std::io::Error> {
        let max_size_bytes = max_size_mb * 1024 * 1024;
        let mut files = self.photo_files()?;
        let mut total_size: u64 = files.iter().map(|(_, m)| m.len()).sum();

        if total_size <= max_size_bytes {
            return Ok(());
        }

        files.sort_by_key(|(_, metadata)| {
            metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        for (path, metadata) in files {
            if total_size <= max_size_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                log::debug!("Evicted cached photo {}", path.display());
                total_size = total_size.saturating_sub(metadata.len());
            }
        }

        Ok(())
    }

    pub fn total_size_bytes(&self) -> Result<u64, std::io::Error> {
        Ok(self.photo_files()?.iter().map(|(_, m)| m.len()).sum())
    }

    /// All cached photos, sorted by hash.
    pub fn list_entries(&self) -> Result<Vec<CacheEntry>, std::io::Error> {
        let mut entries: Vec<CacheEntry> = self
            .photo_files()?
            .into_iter()
            .map(|(path, metadata)| CacheEntry {
                hash: path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_string(),
                size_bytes: metadata.len(),
                path,
            })
            .collect();
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(entries)
    }

    /// Returns true if a file was removed.
    pub fn remove(&self, hash: &str) -> Result<bool, std::io::Error> {
        let path = self.path_for(hash);
        if path.exists() {
            std::fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Remove all cached photos. Returns the number removed.
    pub fn clear_all(&self) -> Result<usize, std::io::Error> {
        let mut count = 0;
        for (path, _) in self.photo_files()? {
            if std::fs::remove_file(&path).is_ok() {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// A cached photo on disk.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub hash: String,
    pub size_bytes: u64,
    pub path: PathBuf,
}
