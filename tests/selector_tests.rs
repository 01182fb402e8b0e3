//! Camera selection policy tests.
//!
//! These tests cover:
//! - Deduplication of built-in and external cameras
//! - Device-class filtering and its fallback
//! - Display order and the default pick
//! - The full discovery pipeline against a stub driver

use std::sync::Arc;

use async_trait::async_trait;

use photobooth::camera::{
    CameraDescriptor, CameraDriver, CameraError, CameraHandle, CameraSelector, DeviceClass,
    ExternalHeuristic, LensDirection, SelectionError,
};

fn cam(id: &str, direction: LensDirection) -> CameraDescriptor {
    CameraDescriptor::new(id, direction)
}

fn ids(cameras: &[CameraDescriptor]) -> Vec<&str> {
    cameras.iter().map(|c| c.id.as_str()).collect()
}

/// Two built-ins plus the same external camera reported twice.
fn kiosk_snapshot() -> Vec<CameraDescriptor> {
    vec![
        cam("0", LensDirection::Front),
        cam("1", LensDirection::Back),
        cam("A1:2,x", LensDirection::External),
        cam("A1:2,y", LensDirection::External),
    ]
}

struct FixedDriver(Result<Vec<CameraDescriptor>, String>);

#[async_trait]
impl CameraDriver for FixedDriver {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError> {
        self.0.clone().map_err(CameraError::QueryFailed)
    }

    async fn open(&self, _camera: &CameraDescriptor) -> Result<Box<dyn CameraHandle>, CameraError> {
        Err(CameraError::OpenFailed("not supported".to_string()))
    }
}

// === Example scenario ===

#[test]
fn test_duplicate_external_collapses_and_leads() {
    let selector = CameraSelector::new(DeviceClass::Phone);

    let deduped = selector.deduplicate(&kiosk_snapshot());
    assert_eq!(ids(&deduped), vec!["0", "1", "A1:2,x"]);

    let ordered = selector.order_for_display(&deduped);
    assert_eq!(ids(&ordered), vec!["A1:2,x", "0", "1"]);

    let default = selector.pick_default(&ordered).unwrap();
    assert_eq!(default.id, "A1:2,x");
}

// === Deduplication ===

#[test]
fn test_dedup_is_idempotent() {
    let selector = CameraSelector::default();
    let snapshot = vec![
        cam("0", LensDirection::Front),
        cam("2", LensDirection::Front),
        cam("Camera 1", LensDirection::External),
        cam("USB Camera 1", LensDirection::External),
        cam("usb:bus:3", LensDirection::Back),
        cam("x", LensDirection::Unknown),
    ];

    let once = selector.deduplicate(&snapshot);
    let twice = selector.deduplicate(&once);
    assert_eq!(once, twice);
}

#[test]
fn test_dedup_caps_builtins_per_direction() {
    let selector = CameraSelector::default();
    let snapshot = vec![
        cam("0", LensDirection::Back),
        cam("1", LensDirection::Front),
        cam("2", LensDirection::Back),
        cam("3", LensDirection::Front),
        cam("4", LensDirection::Back),
    ];

    let result = selector.deduplicate(&snapshot);

    let fronts = result
        .iter()
        .filter(|c| c.lens_direction == LensDirection::Front)
        .count();
    let backs = result
        .iter()
        .filter(|c| c.lens_direction == LensDirection::Back)
        .count();
    assert_eq!(fronts, 1);
    assert_eq!(backs, 1);
    assert_eq!(ids(&result), vec!["0", "1"]);
}

#[test]
fn test_dedup_distinct_externals_survive() {
    let selector = CameraSelector::default();
    let snapshot = vec![
        cam("Camera 1", LensDirection::External),
        cam("Camera 2", LensDirection::External),
        cam("Camera2", LensDirection::External),
    ];

    let result = selector.deduplicate(&snapshot);
    assert_eq!(ids(&result), vec!["Camera 1", "Camera 2"]);
}

#[test]
fn test_dedup_treats_external_looking_back_camera_as_external() {
    let selector = CameraSelector::default();
    // The platform reports both as back cameras, but the ids say USB
    let snapshot = vec![
        cam("0", LensDirection::Back),
        cam("usb:1:5", LensDirection::Back),
        cam("usb:2:6", LensDirection::Back),
    ];

    let result = selector.deduplicate(&snapshot);
    assert_eq!(ids(&result), vec!["0", "usb:1:5", "usb:2:6"]);
}

// === Filtering ===

#[test]
fn test_tablet_keeps_only_external() {
    let selector = CameraSelector::default();
    let result = selector.filter_by_device_class(&kiosk_snapshot(), DeviceClass::TabletOrTv);
    assert_eq!(ids(&result), vec!["A1:2,x", "A1:2,y"]);
}

#[test]
fn test_phone_keeps_only_builtin() {
    let selector = CameraSelector::default();
    let result = selector.filter_by_device_class(&kiosk_snapshot(), DeviceClass::Phone);
    assert_eq!(ids(&result), vec!["0", "1"]);
}

#[test]
fn test_filter_never_empties_nonempty_input() {
    let selector = CameraSelector::default();
    let builtins = vec![cam("0", LensDirection::Front), cam("1", LensDirection::Back)];
    let externals = vec![cam("Camera 4", LensDirection::External)];

    assert_eq!(
        selector.filter_by_device_class(&builtins, DeviceClass::TabletOrTv),
        builtins
    );
    assert_eq!(
        selector.filter_by_device_class(&externals, DeviceClass::Phone),
        externals
    );
}

// === Ordering and default pick ===

#[test]
fn test_order_is_stable_within_groups() {
    let selector = CameraSelector::default();
    let snapshot = vec![
        cam("0", LensDirection::Front),
        cam("Camera 7", LensDirection::External),
        cam("1", LensDirection::Back),
        cam("Camera 3", LensDirection::External),
    ];

    let ordered = selector.order_for_display(&snapshot);
    assert_eq!(ids(&ordered), vec!["Camera 7", "Camera 3", "0", "1"]);
}

#[test]
fn test_default_is_first_builtin_without_externals() {
    let selector = CameraSelector::default();
    let snapshot = vec![cam("1", LensDirection::Back), cam("0", LensDirection::Front)];
    assert_eq!(selector.pick_default(&snapshot).unwrap().id, "1");
}

#[test]
fn test_default_prefers_reported_external_over_id_heuristic() {
    let selector = CameraSelector::default();
    let snapshot = vec![
        cam("webcam-back", LensDirection::Back),
        cam("Camera 9", LensDirection::External),
    ];
    assert_eq!(selector.pick_default(&snapshot).unwrap().id, "Camera 9");
}

#[derive(Debug)]
struct PrefixHeuristic(&'static str);

impl ExternalHeuristic for PrefixHeuristic {
    fn looks_external(&self, id: &str) -> bool {
        id.starts_with(self.0)
    }
}

#[test]
fn test_injected_heuristic_drives_selection() {
    let selector = CameraSelector::new(DeviceClass::TabletOrTv)
        .with_heuristic(Arc::new(PrefixHeuristic("hdmi-")));
    let snapshot = vec![
        cam("usb-cam", LensDirection::Back),
        cam("hdmi-capture", LensDirection::Back),
    ];

    let filtered = selector.filter_by_device_class(&snapshot, DeviceClass::TabletOrTv);
    assert_eq!(ids(&filtered), vec!["hdmi-capture"]);
    assert_eq!(selector.pick_default(&snapshot).unwrap().id, "hdmi-capture");
}

// === Discovery pipeline ===

#[tokio::test]
async fn test_discover_on_tablet() {
    let selector = CameraSelector::new(DeviceClass::TabletOrTv);
    let driver = FixedDriver(Ok(kiosk_snapshot()));

    let cameras = selector.discover(&driver).await.unwrap();
    assert_eq!(ids(&cameras), vec!["A1:2,x"]);
}

#[tokio::test]
async fn test_discover_on_phone() {
    let selector = CameraSelector::new(DeviceClass::Phone);
    let driver = FixedDriver(Ok(kiosk_snapshot()));

    let cameras = selector.discover(&driver).await.unwrap();
    assert_eq!(ids(&cameras), vec!["0", "1"]);
}

#[tokio::test]
async fn test_discover_empty_snapshot() {
    let selector = CameraSelector::default();
    let driver = FixedDriver(Ok(Vec::new()));

    let cameras = selector.discover(&driver).await.unwrap();
    assert!(cameras.is_empty());
    assert!(matches!(
        selector.pick_default(&cameras),
        Err(SelectionError::NoCameraAvailable)
    ));
}

#[tokio::test]
async fn test_discover_propagates_driver_failure() {
    let selector = CameraSelector::default();
    let driver = FixedDriver(Err("device bus unavailable".to_string()));

    let err = selector.discover(&driver).await.unwrap_err();
    assert!(matches!(err, SelectionError::EnumerationFailed(_)));
    assert!(err.to_string().contains("device bus unavailable"));
}
