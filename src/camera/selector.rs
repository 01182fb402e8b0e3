//! Camera discovery policy: deduplication, device-class filtering, display
//! ordering and default selection.
//!
//! Everything here is a pure function of the descriptor list except
//! [`CameraSelector::enumerate`] and [`CameraSelector::discover`], which query
//! the driver once and never cache the result. Callers re-enumerate to observe
//! hotplug changes.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::driver::CameraDriver;
use super::types::{CameraDescriptor, CameraError, LensDirection};

/// Minimum id length for the UUID-shaped heuristic.
const UUID_LIKE_MIN_LEN: usize = 30;

/// Substrings that mark an id as belonging to an external camera.
const EXTERNAL_ID_KEYWORDS: &[&str] = &["usb", "webcam", "external"];

/// Decides whether a driver-reported id looks like an external camera.
///
/// Platforms sometimes misreport the lens direction of USB cameras, so the
/// selector falls back to inspecting the id. The predicate is injected so it
/// can be swapped per platform without touching the orchestrator.
pub trait ExternalHeuristic: Send + Sync {
    fn looks_external(&self, id: &str) -> bool;
}

/// Default id heuristic: UUID-shaped ids, or ids mentioning usb/webcam/external.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdPatternHeuristic;

impl ExternalHeuristic for IdPatternHeuristic {
    fn looks_external(&self, id: &str) -> bool {
        if id.len() > UUID_LIKE_MIN_LEN && id.contains('-') {
            return true;
        }
        let lower = id.to_lowercase();
        EXTERNAL_ID_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
    }
}

/// Form factor of the kiosk device, which decides which cameras are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    /// Phones show only built-in cameras.
    Phone,
    /// Tablets and TV boxes show only external cameras.
    #[default]
    TabletOrTv,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Phone => f.write_str("phone"),
            DeviceClass::TabletOrTv => f.write_str("tablet-or-tv"),
        }
    }
}

/// Errors from camera discovery and selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("Failed to enumerate cameras: {0}")]
    EnumerationFailed(#[from] CameraError),

    #[error("No cameras available")]
    NoCameraAvailable,
}

fn camera_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"Camera\s*(\d+)").expect("static regex is valid"))
}

/// Identity key used to spot the same external camera under different ids.
///
/// - `Camera 2` style ids reduce to the digits.
/// - Colon-separated ids reduce to the last segment, cut at the first comma.
/// - Anything else is its own key.
pub fn normalized_key(id: &str) -> String {
    if let Some(captures) = camera_number_pattern().captures(id) {
        if let Some(digits) = captures.get(1) {
            return digits.as_str().to_string();
        }
    }
    if id.contains(':') {
        let last_segment = id.rsplit(':').next().unwrap_or(id);
        let key = last_segment.split(',').next().unwrap_or(last_segment);
        return key.to_string();
    }
    id.to_string()
}

/// Camera selection policy bound to one device class and one id heuristic.
#[derive(Clone)]
pub struct CameraSelector {
    heuristic: Arc<dyn ExternalHeuristic>,
    device_class: DeviceClass,
}

impl fmt::Debug for CameraSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSelector")
            .field("device_class", &self.device_class)
            .finish_non_exhaustive()
    }
}

impl Default for CameraSelector {
    fn default() -> Self {
        Self::new(DeviceClass::default())
    }
}

impl CameraSelector {
    /// Create a selector using the default id heuristic.
    pub fn new(device_class: DeviceClass) -> Self {
        Self {
            heuristic: Arc::new(IdPatternHeuristic),
            device_class,
        }
    }

    /// Replace the id heuristic.
    pub fn with_heuristic(mut self, heuristic: Arc<dyn ExternalHeuristic>) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    /// True when only the id heuristic marks the camera as external.
    pub fn looks_external(&self, camera: &CameraDescriptor) -> bool {
        self.heuristic.looks_external(&camera.id)
    }

    /// Reported direction is external, or the id looks external.
    pub fn is_external(&self, camera: &CameraDescriptor) -> bool {
        camera.is_flagged_external() || self.looks_external(camera)
    }

    /// Query the driver for a fresh snapshot.
    pub async fn enumerate(
        &self,
        driver: &dyn CameraDriver,
    ) -> Result<Vec<CameraDescriptor>, SelectionError> {
        let cameras = driver.enumerate().await?;
        log::debug!("Driver reported {} camera(s)", cameras.len());
        Ok(cameras)
    }

    /// Enumerate, deduplicate, filter by device class and order for display.
    pub async fn discover(
        &self,
        driver: &dyn CameraDriver,
    ) -> Result<Vec<CameraDescriptor>, SelectionError> {
        let cameras = self.enumerate(driver).await?;
        let cameras = self.deduplicate(&cameras);
        let cameras = self.filter_by_device_class(&cameras, self.device_class);
        Ok(self.order_for_display(&cameras))
    }

    /// Keep at most one front and one back built-in camera, and one external
    /// camera per normalized key. First occurrence wins.
    pub fn deduplicate(&self, cameras: &[CameraDescriptor]) -> Vec<CameraDescriptor> {
        let mut seen_front = false;
        let mut seen_back = false;
        let mut external_keys = HashSet::new();
        let mut result = Vec::with_capacity(cameras.len());

        for camera in cameras {
            let keep = if self.is_external(camera) {
                external_keys.insert(normalized_key(&camera.id))
            } else {
                match camera.lens_direction {
                    LensDirection::Front => !std::mem::replace(&mut seen_front, true),
                    LensDirection::Back => !std::mem::replace(&mut seen_back, true),
                    _ => true,
                }
            };

            if keep {
                result.push(camera.clone());
            } else {
                log::debug!("Dropping duplicate camera {}", camera);
            }
        }

        result
    }

    /// Tablets/TVs keep external cameras, phones keep built-in cameras.
    ///
    /// Returns the input unchanged when filtering would leave nothing.
    pub fn filter_by_device_class(
        &self,
        cameras: &[CameraDescriptor],
        device_class: DeviceClass,
    ) -> Vec<CameraDescriptor> {
        let want_external = device_class == DeviceClass::TabletOrTv;
        let filtered: Vec<CameraDescriptor> = cameras
            .iter()
            .filter(|camera| self.is_external(camera) == want_external)
            .cloned()
            .collect();

        if filtered.is_empty() {
            if !cameras.is_empty() {
                log::warn!(
                    "No cameras match device class {}, showing all {} camera(s)",
                    device_class,
                    cameras.len()
                );
            }
            return cameras.to_vec();
        }
        filtered
    }

    /// External cameras first, original order otherwise.
    pub fn order_for_display(&self, cameras: &[CameraDescriptor]) -> Vec<CameraDescriptor> {
        let mut ordered = cameras.to_vec();
        // sort_by_key is stable
        ordered.sort_by_key(|camera| !self.is_external(camera));
        ordered
    }

    /// First direction-external camera, else first external-looking id,
    /// else the first camera.
    pub fn pick_default(
        &self,
        cameras: &[CameraDescriptor],
    ) -> Result<CameraDescriptor, SelectionError> {
        cameras
            .iter()
            .find(|camera| camera.is_flagged_external())
            .or_else(|| cameras.iter().find(|camera| self.looks_external(camera)))
            .or_else(|| cameras.first())
            .cloned()
            .ok_or(SelectionError::NoCameraAvailable)
    }
}
