//! The capture/upload state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::OrchestratorError;
use super::settings::OrchestratorSettings;
use super::state::{OrchestrationState, Phase};
use crate::api::{SessionApi, SessionProvider};
use crate::camera::{CameraDescriptor, CameraDriver, CameraHandle, CameraSelector, SelectionError};
use crate::photo::{encode_data_url, CapturedPhoto, ImageNormalizer, PhotoPicker};

/// External collaborators the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub driver: Arc<dyn CameraDriver>,
    pub normalizer: Arc<dyn ImageNormalizer>,
    pub picker: Arc<dyn PhotoPicker>,
    pub api: Arc<dyn SessionApi>,
    pub session: Arc<dyn SessionProvider>,
}

/// Countdown task plus the generation it was started with.
struct CountdownSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    collab: Collaborators,
    selector: CameraSelector,
    settings: OrchestratorSettings,
    state: watch::Sender<OrchestrationState>,
    /// The single active camera. Held across release and reopen so a new
    /// device never opens while the old one is still releasing.
    camera: tokio::sync::Mutex<Option<Box<dyn CameraHandle>>>,
    photo: Mutex<Option<CapturedPhoto>>,
    countdown: Mutex<CountdownSlot>,
    upload_ticker: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by teardown. An upload that started under an older epoch
    /// leaves the state alone when it finishes.
    upload_epoch: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn update(&self, f: impl FnOnce(&mut OrchestrationState)) {
        self.state.send_modify(|state| {
            f(state);
            if state.phase != Phase::CountingDown {
                state.countdown_value = None;
            }
        });
    }

    fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    fn current_photo(&self) -> Option<CapturedPhoto> {
        lock(&self.photo).clone()
    }

    fn stop_upload_ticker(&self) {
        if let Some(handle) = lock(&self.upload_ticker).take() {
            handle.abort();
        }
    }

    /// Stop the ticker and orphan any in-flight upload.
    fn abandon_upload(&self) {
        self.upload_epoch.fetch_add(1, Ordering::SeqCst);
        self.stop_upload_ticker();
    }

    /// Abort the countdown task, if any. Returns true if one was running.
    fn abort_countdown(&self) -> bool {
        let mut slot = lock(&self.countdown);
        match slot.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Take ownership of the countdown slot from inside the countdown task.
    /// Fails if the countdown was cancelled or replaced meanwhile.
    fn claim_countdown(&self, generation: u64) -> bool {
        let mut slot = lock(&self.countdown);
        if slot.generation != generation {
            return false;
        }
        // Dropping the handle detaches the task instead of aborting it
        slot.handle.take().is_some()
    }
}

/// Drives the booth's capture/upload lifecycle.
///
/// Cloning is cheap and every clone controls the same session. The
/// orchestrator is the only writer of [`OrchestrationState`]; consumers
/// observe snapshots through [`Orchestrator::subscribe`].
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.inner.phase())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        collab: Collaborators,
        selector: CameraSelector,
        settings: OrchestratorSettings,
    ) -> Self {
        let (state, _) = watch::channel(OrchestrationState::default());
        Self {
            inner: Arc::new(Inner {
                collab,
                selector,
                settings,
                state,
                camera: tokio::sync::Mutex::new(None),
                photo: Mutex::new(None),
                countdown: Mutex::new(CountdownSlot {
                    generation: 0,
                    handle: None,
                }),
                upload_ticker: Mutex::new(None),
                upload_epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Receive every state snapshot from now on.
    pub fn subscribe(&self) -> watch::Receiver<OrchestrationState> {
        self.inner.state.subscribe()
    }

    /// Copy of the current state.
    pub fn state(&self) -> OrchestrationState {
        self.inner.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    pub fn current_photo(&self) -> Option<CapturedPhoto> {
        self.inner.current_photo()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    /// Record `error`, move to `phase` and hand the error back.
    fn fail<T>(&self, phase: Phase, error: OrchestratorError) -> Result<T, OrchestratorError> {
        log::warn!("{} (phase -> {})", error, phase);
        let stored = error.clone();
        self.inner.update(|s| {
            s.phase = phase;
            s.last_error = Some(stored);
        });
        Err(error)
    }

    /// Where to settle after a non-fatal problem outside capture: keep
    /// showing the photo if there is one.
    fn resting_phase(&self) -> Phase {
        if self.inner.current_photo().is_some() {
            Phase::Captured
        } else {
            Phase::Ready
        }
    }

    /// Dispose the active camera, if any, and wait for it to settle.
    async fn release_camera(&self, slot: &mut Option<Box<dyn CameraHandle>>) {
        if let Some(mut handle) = slot.take() {
            log::info!("Releasing camera {}", handle.descriptor());
            handle.dispose().await;
            tokio::time::sleep(self.inner.settings.camera_settle).await;
        }
    }

    /// Tear everything down and start over with the default camera.
    ///
    /// Does nothing while a capture is in progress.
    pub async fn reset_and_initialize(&self) -> Result<(), OrchestratorError> {
        if self.phase().blocks_camera_changes() {
            log::warn!("Reset blocked: capture in progress");
            return Ok(());
        }

        self.inner.abort_countdown();
        self.inner.abandon_upload();
        {
            let mut slot = self.inner.camera.lock().await;
            self.release_camera(&mut slot).await;
        }
        *lock(&self.inner.photo) = None;
        self.inner.update(|s| {
            *s = OrchestrationState {
                phase: Phase::Initializing,
                ..OrchestrationState::default()
            };
        });
        log::info!("Discovering cameras");

        let driver = Arc::clone(&self.inner.collab.driver);
        let cameras = match self.inner.selector.discover(driver.as_ref()).await {
            Ok(cameras) => cameras,
            Err(SelectionError::EnumerationFailed(e)) => {
                return self.fail(Phase::Error, OrchestratorError::EnumerationFailed(e.to_string()))
            }
            Err(SelectionError::NoCameraAvailable) => {
                return self.fail(Phase::Error, OrchestratorError::NoCameraAvailable)
            }
        };

        let listed = cameras.clone();
        self.inner.update(|s| s.available_cameras = listed);

        let default = match self.inner.selector.pick_default(&cameras) {
            Ok(camera) => camera,
            Err(_) => return self.fail(Phase::Error, OrchestratorError::NoCameraAvailable),
        };
        log::info!(
            "Found {} camera(s), default is {}",
            cameras.len(),
            default
        );

        self.initialize_camera(default).await
    }

    /// Switch to another camera. The current camera is fully released first.
    ///
    /// No-op while capturing or when `target` is already active.
    pub async fn switch_camera(&self, target: CameraDescriptor) -> Result<(), OrchestratorError> {
        if self.phase().blocks_camera_changes() {
            log::warn!("Camera switch blocked: capture in progress");
            return Ok(());
        }
        let already_active = self
            .inner
            .state
            .borrow()
            .current_camera
            .as_ref()
            .is_some_and(|current| current.id == target.id);
        if already_active {
            log::debug!("Camera {} already active", target);
            return Ok(());
        }

        if self.inner.abort_countdown() {
            log::info!("Countdown cancelled by camera switch");
        }
        log::info!("Switching camera to {}", target);
        self.initialize_camera(target).await
    }

    /// Open `camera` and verify the platform opened exactly that device.
    pub async fn initialize_camera(
        &self,
        camera: CameraDescriptor,
    ) -> Result<(), OrchestratorError> {
        if self.phase().blocks_camera_changes() {
            log::warn!("Camera initialization blocked: capture in progress");
            return Ok(());
        }

        let mut slot = self.inner.camera.lock().await;
        self.inner.update(|s| {
            s.phase = Phase::Initializing;
            s.current_camera = None;
        });
        self.release_camera(&mut slot).await;

        let driver = Arc::clone(&self.inner.collab.driver);
        if let Err(e) = driver.request_permission().await {
            return self.fail(Phase::Error, OrchestratorError::from_open_error(e));
        }

        let mut handle = match driver.open(&camera).await {
            Ok(handle) => handle,
            Err(e) => return self.fail(Phase::Error, OrchestratorError::from_open_error(e)),
        };

        if !handle.descriptor().matches(&camera) {
            let opened = handle.descriptor().clone();
            log::error!("Requested camera {} but platform opened {}", camera, opened);
            handle.dispose().await;
            return self.fail(
                Phase::Error,
                OrchestratorError::WrongCameraSelected {
                    requested: camera.id,
                    opened: opened.id,
                },
            );
        }

        *slot = Some(handle);
        drop(slot);

        log::info!("Camera {} ready", camera);
        let has_photo = self.inner.current_photo().is_some();
        self.inner.update(|s| {
            s.phase = if has_photo { Phase::Captured } else { Phase::Ready };
            s.current_camera = Some(camera);
            s.last_error = None;
        });
        Ok(())
    }

    /// Count down from `seconds` at one tick per second, then capture.
    ///
    /// Only starts from [`Phase::Ready`]; any other phase returns `Busy`.
    pub fn start_countdown(&self, seconds: u32) -> Result<(), OrchestratorError> {
        let phase = self.phase();
        if phase != Phase::Ready {
            log::warn!("Countdown not started: phase is {}", phase);
            return Err(OrchestratorError::Busy(format!("cannot count down while {}", phase)));
        }

        let mut slot = lock(&self.inner.countdown);
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }
        slot.generation += 1;
        let generation = slot.generation;

        self.inner.update(|s| {
            s.phase = Phase::CountingDown;
            s.countdown_value = (seconds > 0).then_some(seconds);
            s.last_error = None;
        });
        log::info!("Countdown started from {}", seconds);

        let this = self.clone();
        slot.handle = Some(tokio::spawn(async move {
            this.run_countdown(generation, seconds).await;
        }));
        Ok(())
    }

    async fn run_countdown(&self, generation: u64, seconds: u32) {
        let settings = self.inner.settings;
        for value in (1..=seconds).rev() {
            self.inner.update(|s| s.countdown_value = Some(value));
            log::debug!("Countdown {}", value);
            tokio::time::sleep(settings.countdown_tick).await;
        }
        self.inner.update(|s| s.countdown_value = None);
        tokio::time::sleep(settings.capture_settle).await;

        if !self.inner.claim_countdown(generation) {
            return;
        }
        // Failures are already recorded in the state
        let _ = self.take_photo().await;
    }

    /// Stop a running countdown. Returns true if one was cancelled.
    pub fn cancel_countdown(&self) -> bool {
        if !self.inner.abort_countdown() {
            return false;
        }
        log::info!("Countdown cancelled");
        self.inner.update(|s| {
            if s.phase == Phase::CountingDown {
                s.phase = Phase::Ready;
            }
        });
        true
    }

    async fn normalize(&self, raw: Vec<u8>) -> Result<Vec<u8>, String> {
        let normalizer = Arc::clone(&self.inner.collab.normalizer);
        match tokio::task::spawn_blocking(move || normalizer.normalize(&raw)).await {
            Ok(Ok(jpeg)) => Ok(jpeg),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("normalization task failed: {}", e)),
        }
    }

    fn set_photo(&self, photo: CapturedPhoto) {
        // Replacing drops the previous photo's bytes once no clone holds them
        *lock(&self.inner.photo) = Some(photo);
    }

    /// Take a photo with the active camera. A running countdown is cancelled
    /// so it cannot fire a second capture.
    ///
    /// Failures leave the machine in [`Phase::Ready`] with `last_error` set.
    pub async fn capture(&self) -> Result<CapturedPhoto, OrchestratorError> {
        let phase = self.phase();
        if matches!(phase, Phase::Capturing | Phase::Uploading) {
            return Err(OrchestratorError::Busy(format!("cannot capture while {}", phase)));
        }
        if self.inner.abort_countdown() {
            log::info!("Countdown superseded by manual capture");
        }
        self.take_photo().await
    }

    async fn take_photo(&self) -> Result<CapturedPhoto, OrchestratorError> {
        let phase = self.phase();
        if matches!(phase, Phase::Capturing | Phase::Uploading) {
            return Err(OrchestratorError::Busy(format!("cannot capture while {}", phase)));
        }

        let mut slot = self.inner.camera.lock().await;
        let handle = match slot.as_mut() {
            Some(handle) if handle.is_ready() => handle,
            _ => return self.fail(Phase::Ready, OrchestratorError::CameraNotReady),
        };

        self.inner.update(|s| s.phase = Phase::Capturing);
        let camera_id = handle.descriptor().id.clone();
        let pre_normalized = handle.emits_normalized();
        log::info!("Capturing from {}", camera_id);

        let captured =
            tokio::time::timeout(self.inner.settings.capture_timeout, handle.capture()).await;
        drop(slot);

        let raw = match captured {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                return self.fail(Phase::Ready, OrchestratorError::from_capture_error(e))
            }
            Err(_) => return self.fail(Phase::Ready, OrchestratorError::CaptureTimeout),
        };

        let data = if pre_normalized {
            raw
        } else {
            match self.normalize(raw).await {
                Ok(jpeg) => jpeg,
                Err(e) => return self.fail(Phase::Ready, OrchestratorError::CaptureFailed(e)),
            }
        };

        let photo = CapturedPhoto::from_camera(data, camera_id);
        log::info!("Captured photo {} ({} bytes)", photo.id, photo.len());
        self.set_photo(photo.clone());
        self.inner.update(|s| {
            s.phase = Phase::Captured;
            s.last_error = None;
        });
        Ok(photo)
    }

    /// Pick a photo from the gallery and normalize it like a capture.
    ///
    /// Returns `Ok(None)` when the user cancels.
    pub async fn select_from_gallery(&self) -> Result<Option<CapturedPhoto>, OrchestratorError> {
        let phase = self.phase();
        if matches!(phase, Phase::Capturing | Phase::Uploading) {
            return Err(OrchestratorError::Busy(format!("cannot pick while {}", phase)));
        }
        if self.inner.abort_countdown() {
            log::info!("Countdown cancelled by gallery pick");
        }

        let raw = match self.inner.collab.picker.pick().await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::info!("Gallery pick cancelled");
                let resting = self.resting_phase();
                self.inner.update(|s| s.phase = resting);
                return Ok(None);
            }
            Err(e) => {
                let resting = self.resting_phase();
                return self.fail(resting, OrchestratorError::GalleryReadFailed(e.to_string()));
            }
        };

        let data = match self.normalize(raw).await {
            Ok(jpeg) => jpeg,
            Err(e) => {
                let resting = self.resting_phase();
                return self.fail(resting, OrchestratorError::GalleryReadFailed(e));
            }
        };

        let photo = CapturedPhoto::from_gallery(data);
        log::info!("Picked photo {} ({} bytes)", photo.id, photo.len());
        self.set_photo(photo.clone());
        self.inner.update(|s| {
            s.phase = Phase::Captured;
            s.last_error = None;
        });
        Ok(Some(photo))
    }

    /// Discard the current photo and any error.
    pub fn clear_captured_photo(&self) -> Result<(), OrchestratorError> {
        let phase = self.phase();
        if matches!(phase, Phase::Capturing | Phase::Uploading) {
            return Err(OrchestratorError::Busy(format!("cannot clear while {}", phase)));
        }
        if self.inner.abort_countdown() {
            log::info!("Countdown cancelled by clear");
        }
        *lock(&self.inner.photo) = None;
        self.inner.update(|s| {
            s.phase = Phase::Ready;
            s.last_error = None;
        });
        Ok(())
    }

    /// Upload the current photo to the session from the session provider.
    pub async fn upload_current_photo(&self) -> Result<(), OrchestratorError> {
        let photo = self.inner.current_photo();
        let session_id = self.inner.collab.session.session_id();
        self.upload_to_session(photo.as_ref(), session_id.as_deref())
            .await
    }

    fn start_upload_ticker(&self) {
        let mut slot = lock(&self.inner.upload_ticker);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        let inner = Arc::clone(&self.inner);
        let tick = inner.settings.upload_tick;
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                inner.update(|s| s.upload_elapsed_seconds += 1);
            }
        }));
    }

    /// Send `photo` to `session_id`, then kick off preprocessing.
    ///
    /// Encoding and the PATCH share one timeout. Failures return the machine
    /// to [`Phase::Captured`] so the guest can retry. If the orchestrator is
    /// reset or disposed meanwhile, the outcome is returned but neither the
    /// state nor preprocessing is touched.
    pub async fn upload_to_session(
        &self,
        photo: Option<&CapturedPhoto>,
        session_id: Option<&str>,
    ) -> Result<(), OrchestratorError> {
        let phase = self.phase();
        if matches!(phase, Phase::Capturing | Phase::Uploading) {
            return Err(OrchestratorError::Busy(format!("cannot upload while {}", phase)));
        }
        if self.inner.abort_countdown() {
            log::info!("Countdown cancelled by upload");
        }

        let Some(photo) = photo.cloned() else {
            let resting = self.resting_phase();
            return self.fail(resting, OrchestratorError::NoPhoto);
        };
        let Some(session_id) = session_id.filter(|id| !id.is_empty()).map(str::to_string) else {
            let resting = self.resting_phase();
            return self.fail(resting, OrchestratorError::NoSession);
        };

        let epoch = self.inner.upload_epoch.load(Ordering::SeqCst);
        self.inner.update(|s| {
            s.phase = Phase::Uploading;
            s.upload_elapsed_seconds = 0;
            s.last_error = None;
        });
        self.start_upload_ticker();
        log::info!("Uploading photo {} to session {}", photo.id, session_id);

        let upload_timeout = self.inner.settings.upload_timeout;
        let api = Arc::clone(&self.inner.collab.api);
        let data = photo.shared_data();
        let upload = async {
            let data_url = tokio::task::spawn_blocking(move || encode_data_url(&data))
                .await
                .map_err(|e| OrchestratorError::ApiError(format!("encoding failed: {}", e)))?;
            api.update_session_image(&session_id, data_url, upload_timeout)
                .await
                .map_err(OrchestratorError::from_upload_error)
        };
        let result = match tokio::time::timeout(upload_timeout, upload).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::UploadTimeout),
        };

        if self.inner.upload_epoch.load(Ordering::SeqCst) != epoch {
            log::info!(
                "Upload to session {} finished after teardown; state left as is",
                session_id
            );
            return result;
        }
        self.inner.stop_upload_ticker();

        if let Err(e) = result {
            return self.fail(Phase::Captured, e);
        }

        {
            let mut current = lock(&self.inner.photo);
            if current.as_ref().is_some_and(|p| p.id == photo.id) {
                *current = None;
            }
        }
        self.inner.update(|s| {
            s.phase = Phase::UploadedReady;
            s.last_error = None;
        });
        log::info!("Upload to session {} complete", session_id);

        self.spawn_preprocess(session_id);
        Ok(())
    }

    /// Start preprocessing without waiting for it. The outcome is only
    /// logged; panics stop at the task boundary.
    fn spawn_preprocess(&self, session_id: String) {
        let api = Arc::clone(&self.inner.collab.api);
        let request_session = session_id.clone();
        let task = tokio::spawn(async move { api.preprocess_image(&request_session).await });

        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => log::info!("Preprocessing started for session {}", session_id),
                Ok(Err(e)) => {
                    log::warn!("Preprocess request for session {} failed: {}", session_id, e)
                }
                Err(e) if e.is_panic() => {
                    log::error!("Preprocess task for session {} panicked", session_id)
                }
                Err(e) => log::debug!("Preprocess task for session {} ended: {}", session_id, e),
            }
        });
    }

    /// Stop timers and release the camera. Safe to call repeatedly.
    pub async fn dispose(&self) {
        self.inner.abort_countdown();
        self.inner.abandon_upload();
        {
            let mut slot = self.inner.camera.lock().await;
            if let Some(mut handle) = slot.take() {
                log::info!("Disposing camera {}", handle.descriptor());
                handle.dispose().await;
            }
        }
        self.inner.update(|s| {
            s.phase = Phase::Idle;
            s.current_camera = None;
        });
    }
}
