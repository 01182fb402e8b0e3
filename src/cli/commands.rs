//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::args::{Args, CacheAction, Command, ConfigAction};
use crate::api::{SessionApi, SessionClient, SessionContext};
use crate::camera::{CameraDriver, CameraSelector, DeviceClass, FfmpegCameraDriver};
use crate::config::{default_path as get_config_path, Config, DEFAULT_CONFIG_TEMPLATE};
use crate::orchestrator::{Collaborators, Orchestrator, OrchestratorError, Phase};
use crate::photo::{CapturedPhoto, FilePicker, PhotoCache};

/// How often `fetch-result` asks the API whether the result is ready.
const RESULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Time the detached preprocess request gets before the CLI exits.
const PREPROCESS_GRACE: Duration = Duration::from_secs(2);

/// Run the parsed command.
pub async fn dispatch(args: Args, config: Config) -> Result<(), String> {
    let device_class = args
        .device_class
        .map(DeviceClass::from)
        .unwrap_or(config.camera.device_class);

    match args.command {
        Command::ListCameras { all } => list_cameras(&config, device_class, all).await,
        Command::Capture {
            camera,
            countdown,
            output,
            no_cache,
        } => {
            let booth = Booth::new(&config, device_class, None, SessionContext::new())?;
            let countdown = countdown.unwrap_or(config.camera.countdown_seconds);
            let photo = capture_with_countdown(&booth.orchestrator, camera.as_deref(), countdown)
                .await;
            booth.orchestrator.dispose().await;
            let photo = photo?;

            if !no_cache {
                cache_photo(&config, &photo);
            }
            if let Some(path) = output {
                write_photo(&photo, &path)?;
                println!("Saved photo to {}", path.display());
            } else {
                println!("Captured photo {} ({})", photo.id, format_size(photo.len() as u64));
            }
            Ok(())
        }
        Command::Upload { file, session } => {
            let booth = Booth::new(
                &config,
                device_class,
                Some(file),
                SessionContext::with_session(session.clone()),
            )?;
            booth.pick_and_upload().await?;
            println!("Uploaded photo to session {}", session);
            Ok(())
        }
        Command::Run {
            theme,
            camera,
            countdown,
            photo,
            output,
            wait,
        } => {
            let countdown = countdown.unwrap_or(config.camera.countdown_seconds);
            run_booth(&config, device_class, &theme, camera, countdown, photo, output, wait).await
        }
        Command::Themes => list_themes(&config).await,
        Command::FetchResult {
            session,
            output,
            wait,
        } => {
            let client = session_client(&config)?;
            fetch_result(&client, &session, output, wait).await
        }
        Command::Cache { action } => run_cache(&config, action),
        Command::Config { action } => handle_config_action(&config, action),
    }
}

fn session_client(config: &Config) -> Result<SessionClient, String> {
    let client = config
        .session_client()
        .map_err(|e| format!("Failed to create API client: {}", e))?;
    if !client.has_api_key() {
        log::debug!("No API key set, sending unauthenticated requests");
    }
    Ok(client)
}

fn camera_driver(config: &Config) -> FfmpegCameraDriver {
    match &config.camera.ffmpeg {
        Some(path) => FfmpegCameraDriver::new().with_ffmpeg(path.clone()),
        None => FfmpegCameraDriver::new(),
    }
}

fn describe(error: &OrchestratorError) -> String {
    error.user_message()
}

/// An orchestrator wired to the real driver, normalizer and API.
struct Booth {
    orchestrator: Orchestrator,
    session: Arc<SessionContext>,
}

impl Booth {
    fn new(
        config: &Config,
        device_class: DeviceClass,
        picked_file: Option<PathBuf>,
        session: SessionContext,
    ) -> Result<Self, String> {
        let session = Arc::new(session);
        let api: Arc<dyn SessionApi> = Arc::new(session_client(config)?);
        let collab = Collaborators {
            driver: Arc::new(camera_driver(config)),
            normalizer: Arc::new(config.normalizer()),
            picker: Arc::new(FilePicker::new(picked_file)),
            api,
            session: session.clone(),
        };
        let orchestrator = Orchestrator::new(
            collab,
            CameraSelector::new(device_class),
            config.orchestrator_settings(),
        );
        Ok(Self {
            orchestrator,
            session,
        })
    }

    /// Load the picked file as the current photo and upload it.
    async fn pick_and_upload(&self) -> Result<(), String> {
        let photo = self
            .orchestrator
            .select_from_gallery()
            .await
            .map_err(|e| describe(&e))?;
        if photo.is_none() {
            return Err("No photo selected".to_string());
        }
        self.upload().await
    }

    async fn upload(&self) -> Result<(), String> {
        let mut rx = self.orchestrator.subscribe();
        let progress = tokio::spawn(async move {
            let mut shown = 0;
            while rx.changed().await.is_ok() {
                let elapsed = rx.borrow_and_update().upload_elapsed_seconds;
                if elapsed > shown {
                    println!("Uploading... {}s", elapsed);
                    shown = elapsed;
                }
            }
        });

        let result = self.orchestrator.upload_current_photo().await;
        progress.abort();
        result.map_err(|e| describe(&e))?;

        // Let the fire-and-forget preprocess request leave before exit
        tokio::time::sleep(PREPROCESS_GRACE).await;
        Ok(())
    }
}

/// Initialize the camera, count down and wait for the photo.
async fn capture_with_countdown(
    orchestrator: &Orchestrator,
    camera: Option<&str>,
    countdown: u32,
) -> Result<CapturedPhoto, String> {
    orchestrator
        .reset_and_initialize()
        .await
        .map_err(|e| describe(&e))?;

    if let Some(id) = camera {
        let target = orchestrator
            .state()
            .available_cameras
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| {
                format!(
                    "Camera '{}' not found. Run 'photobooth list-cameras' to see available cameras.",
                    id
                )
            })?;
        orchestrator
            .switch_camera(target)
            .await
            .map_err(|e| describe(&e))?;
    }

    if let Some(camera) = orchestrator.state().current_camera {
        println!("Using {}", camera);
    }

    let mut rx = orchestrator.subscribe();
    orchestrator
        .start_countdown(countdown)
        .map_err(|e| describe(&e))?;

    let mut shown = None;
    loop {
        let state = rx.borrow_and_update().clone();
        if state.countdown_value != shown {
            if let Some(value) = state.countdown_value {
                println!("{}...", value);
            }
            shown = state.countdown_value;
        }

        match state.phase {
            Phase::Captured => {
                return orchestrator
                    .current_photo()
                    .ok_or_else(|| "Capture finished without a photo".to_string());
            }
            Phase::Ready | Phase::Error | Phase::Idle => {
                return Err(state
                    .last_error
                    .map(|e| describe(&e))
                    .unwrap_or_else(|| "Countdown cancelled".to_string()));
            }
            _ => {}
        }

        rx.changed()
            .await
            .map_err(|_| "Orchestrator stopped unexpectedly".to_string())?;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_booth(
    config: &Config,
    device_class: DeviceClass,
    theme: &str,
    camera: Option<String>,
    countdown: u32,
    photo: Option<PathBuf>,
    output: Option<PathBuf>,
    wait: u64,
) -> Result<(), String> {
    let client = session_client(config)?;
    let session = client
        .create_session(theme)
        .await
        .map_err(|e| format!("Failed to create session: {}", e))?;
    println!("Session {} created", session.id);

    let from_gallery = photo.is_some();
    let booth = Booth::new(
        config,
        device_class,
        photo,
        SessionContext::with_session(session.id.clone()),
    )?;

    let result = if from_gallery {
        booth.pick_and_upload().await
    } else {
        match capture_with_countdown(&booth.orchestrator, camera.as_deref(), countdown).await {
            Ok(photo) => {
                cache_photo(config, &photo);
                booth.upload().await
            }
            Err(e) => Err(e),
        }
    };
    booth.orchestrator.dispose().await;
    booth.session.clear();
    result?;
    println!("Photo uploaded, transformation started");

    if wait == 0 {
        println!(
            "Fetch the result later with: photobooth fetch-result --session {}",
            session.id
        );
        return Ok(());
    }
    fetch_result(&client, &session.id, output, wait).await
}

/// Poll the session until the result is available, then download it.
async fn fetch_result(
    client: &SessionClient,
    session_id: &str,
    output: Option<PathBuf>,
    wait: u64,
) -> Result<(), String> {
    let deadline = Instant::now() + Duration::from_secs(wait);

    let url = loop {
        let session = client
            .get_session(session_id)
            .await
            .map_err(|e| format!("Failed to fetch session: {}", e))?;
        if let Some(url) = session.result_image_url {
            break url;
        }
        if Instant::now() >= deadline {
            return Err(format!(
                "No result for session {} yet (status: {})",
                session_id,
                session.status.as_deref().unwrap_or("unknown")
            ));
        }
        log::debug!("Result for session {} not ready, polling", session_id);
        tokio::time::sleep(RESULT_POLL_INTERVAL).await;
    };

    let dest = output.unwrap_or_else(|| PathBuf::from(format!("photobooth-{}.jpg", session_id)));
    let path = client
        .download_image(&url, &dest)
        .await
        .map_err(|e| format!("Failed to download result: {}", e))?;
    println!("Saved result to {}", path.display());
    Ok(())
}

/// List available cameras and print them to stdout.
async fn list_cameras(config: &Config, device_class: DeviceClass, all: bool) -> Result<(), String> {
    let driver = camera_driver(config);
    let selector = CameraSelector::new(device_class);

    let cameras = if all {
        driver
            .enumerate()
            .await
            .map_err(|e| format!("Failed to list cameras: {}", e))?
    } else {
        selector
            .discover(&driver)
            .await
            .map_err(|e| format!("Failed to list cameras: {}", e))?
    };

    if cameras.is_empty() {
        println!("No cameras found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
        println!("On macOS, grant access in System Settings > Privacy & Security > Camera.");
        return Ok(());
    }

    let default = selector.pick_default(&cameras).ok();
    println!("Available cameras ({}):", device_class);
    for camera in &cameras {
        let marker = if default.as_ref() == Some(camera) { "*" } else { " " };
        let external = if selector.is_external(camera) { " external" } else { "" };
        println!("{} {}{}", marker, camera, external);
    }
    println!();
    println!("Use --camera <id> to select a camera.");
    Ok(())
}

async fn list_themes(config: &Config) -> Result<(), String> {
    let client = session_client(config)?;
    let themes = client
        .list_themes()
        .await
        .map_err(|e| format!("Failed to list themes: {}", e))?;

    if themes.is_empty() {
        println!("No themes available.");
        return Ok(());
    }

    println!("Themes:\n");
    for theme in &themes {
        match &theme.description {
            Some(description) => println!("  {}  {} - {}", theme.id, theme.name, description),
            None => println!("  {}  {}", theme.id, theme.name),
        }
    }
    Ok(())
}

/// Keep a copy of the photo on disk. Cache failures never fail the command.
fn cache_photo(config: &Config, photo: &CapturedPhoto) {
    let cache = config.photo_cache();
    match cache.store_with_cleanup(photo, config.cache.max_size_mb) {
        Ok(path) => log::info!("Cached photo at {}", path.display()),
        Err(e) => log::warn!("Failed to cache photo: {}", e),
    }
}

fn write_photo(photo: &CapturedPhoto, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    std::fs::write(path, photo.data())
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

/// Format bytes as human-readable string (KB, MB, GB)
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn run_cache(config: &Config, action: CacheAction) -> Result<(), String> {
    let cache: PhotoCache = config.photo_cache();

    match action {
        CacheAction::List => {
            let entries = cache
                .list_entries()
                .map_err(|e| format!("Failed to list cache entries: {}", e))?;

            if entries.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }

            println!("Cached photos:\n");
            for entry in &entries {
                println!("  {} {}", entry.hash, format_size(entry.size_bytes));
            }

            let total_size = cache
                .total_size_bytes()
                .map_err(|e| format!("Failed to calculate total size: {}", e))?;
            println!("\nTotal: {} photos, {}", entries.len(), format_size(total_size));
            Ok(())
        }
        CacheAction::Clear { hash: Some(hash) } => {
            let removed = cache
                .remove(&hash)
                .map_err(|e| format!("Failed to remove cached photo: {}", e))?;
            if removed {
                println!("Removed cached photo: {}", hash);
            } else {
                println!("No cached photo found with hash: {}", hash);
            }
            Ok(())
        }
        CacheAction::Clear { hash: None } => {
            let count = cache
                .clear_all()
                .map_err(|e| format!("Failed to clear cache: {}", e))?;
            if count == 0 {
                println!("Cache is already empty.");
            } else {
                println!(
                    "Removed {} cached photo{}.",
                    count,
                    if count == 1 { "" } else { "s" }
                );
            }
            Ok(())
        }
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(config: &Config, action: ConfigAction) -> Result<(), String> {
    let config_path = get_config_path();

    match action {
        ConfigAction::Show => {
            let rendered = toml::to_string_pretty(config)
                .map_err(|e| format!("Failed to render config: {}", e))?;
            println!("Current configuration:\n");
            println!("{}", rendered);

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'photobooth config show' to view current settings.",
                    config_path.display()
                ));
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG_TEMPLATE)
                .map_err(|e| format!("Error writing config file: {}", e))?;

            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}
