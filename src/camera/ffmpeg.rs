//! FFmpeg-backed camera driver.
//!
//! Devices are listed through AVFoundation on macOS and through
//! `/sys/class/video4linux` on Linux. Each capture runs FFmpeg once to grab a
//! single frame piped out as MJPEG.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::driver::{CameraDriver, CameraHandle};
use super::types::{CameraDescriptor, CameraError, LensDirection};

/// Names that identify a camera built into the chassis.
const BUILT_IN_NAME_HINTS: &[&str] = &["facetime", "built-in", "integrated"];

/// Default sysfs root for V4L2 devices.
const V4L2_SYSFS_ROOT: &str = "/sys/class/video4linux";

/// Input format understood by FFmpeg's `-f` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    AvFoundation,
    V4l2,
}

impl InputFormat {
    /// Format for the platform this binary was built for.
    pub fn native() -> Self {
        if cfg!(target_os = "macos") {
            InputFormat::AvFoundation
        } else {
            InputFormat::V4l2
        }
    }

    fn as_ffmpeg_arg(self) -> &'static str {
        match self {
            InputFormat::AvFoundation => "avfoundation",
            InputFormat::V4l2 => "v4l2",
        }
    }
}

/// Guess the lens direction from a device name.
///
/// Desktop platforms do not report direction, so built-in webcams are
/// treated as front-facing and everything else as external.
pub fn classify_name(name: &str) -> LensDirection {
    let lower = name.to_lowercase();
    if BUILT_IN_NAME_HINTS.iter().any(|hint| lower.contains(hint)) {
        LensDirection::Front
    } else {
        LensDirection::External
    }
}

/// Parse one line of FFmpeg's AVFoundation device listing.
///
/// Lines look like `[AVFoundation indev @ 0x...] [0] FaceTime HD Camera`.
pub fn parse_device_line(line: &str) -> Option<(usize, String)> {
    let bracket_idx = line.find("] [")?;
    let after_bracket = &line[bracket_idx + 3..];

    let close_bracket = after_bracket.find(']')?;
    let index: usize = after_bracket[..close_bracket].parse().ok()?;

    let name = after_bracket.get(close_bracket + 1..)?.trim().to_string();
    if name.is_empty() {
        return None;
    }

    Some((index, name))
}

/// Parse the video section of FFmpeg's AVFoundation listing into descriptors.
///
/// Screen capture inputs are skipped.
pub fn parse_avfoundation_cameras(stderr: &str) -> Vec<CameraDescriptor> {
    let mut cameras = Vec::new();
    let mut in_video_section = false;

    for line in stderr.lines() {
        if line.contains("AVFoundation video devices:") {
            in_video_section = true;
            continue;
        }
        if line.contains("AVFoundation audio devices:") {
            in_video_section = false;
            continue;
        }
        if !in_video_section {
            continue;
        }
        if let Some((_, name)) = parse_device_line(line) {
            if name.starts_with("Capture screen") {
                continue;
            }
            cameras.push(CameraDescriptor::new(name.clone(), classify_name(&name)));
        }
    }

    cameras
}

/// Read V4L2 devices from a sysfs-style directory.
///
/// Each `videoN` entry contributes `/dev/videoN` with the name from its
/// `name` file. Entries are returned sorted by device path.
pub fn read_v4l2_cameras(root: &Path) -> Result<Vec<CameraDescriptor>, CameraError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut cameras = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let node = entry.file_name().to_string_lossy().to_string();
        if !node.starts_with("video") {
            continue;
        }
        let name = std::fs::read_to_string(entry.path().join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| node.clone());
        let direction = classify_name(&name);
        cameras.push(CameraDescriptor::new(format!("/dev/{}", node), direction).with_name(name));
    }

    cameras.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(cameras)
}

/// Build FFmpeg arguments that grab one MJPEG frame to stdout.
pub fn build_capture_args(format: InputFormat, device_id: &str) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        format.as_ffmpeg_arg().to_string(),
    ];
    if format == InputFormat::AvFoundation {
        // AVFoundation refuses to open without an explicit rate
        args.push("-framerate".to_string());
        args.push("30".to_string());
    }
    args.extend([
        "-i".to_string(),
        device_id.to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-vcodec".to_string(),
        "mjpeg".to_string(),
        "-".to_string(),
    ]);
    args
}

fn map_ffmpeg_failure(stderr: &str) -> CameraError {
    let msg = stderr.to_lowercase();
    if msg.contains("permission") || msg.contains("not authorized") || msg.contains("denied") {
        CameraError::PermissionDenied
    } else {
        CameraError::CaptureFailed(stderr.trim().to_string())
    }
}

/// Camera driver that shells out to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegCameraDriver {
    ffmpeg: PathBuf,
    format: InputFormat,
    sysfs_root: PathBuf,
}

impl Default for FfmpegCameraDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCameraDriver {
    /// Driver for the native input format using `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            format: InputFormat::native(),
            sysfs_root: PathBuf::from(V4L2_SYSFS_ROOT),
        }
    }

    /// Use a specific FFmpeg binary.
    pub fn with_ffmpeg(mut self, ffmpeg: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self
    }

    /// Override the input format.
    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    /// Read V4L2 devices from another sysfs root.
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    async fn list_avfoundation(&self) -> Result<Vec<CameraDescriptor>, CameraError> {
        let output = Command::new(&self.ffmpeg)
            .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CameraError::QueryFailed("FFmpeg not found on PATH".to_string())
                } else {
                    CameraError::QueryFailed(format!("Failed to run ffmpeg: {}", e))
                }
            })?;

        // FFmpeg prints the listing on stderr and exits non-zero
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(parse_avfoundation_cameras(&stderr))
    }
}

#[async_trait]
impl CameraDriver for FfmpegCameraDriver {
    async fn enumerate(&self) -> Result<Vec<CameraDescriptor>, CameraError> {
        match self.format {
            InputFormat::AvFoundation => self.list_avfoundation().await,
            InputFormat::V4l2 => {
                let root = self.sysfs_root.clone();
                tokio::task::spawn_blocking(move || read_v4l2_cameras(&root))
                    .await
                    .map_err(|e| CameraError::QueryFailed(e.to_string()))?
            }
        }
    }

    async fn open(
        &self,
        camera: &CameraDescriptor,
    ) -> Result<Box<dyn CameraHandle>, CameraError> {
        let cameras = self.enumerate().await?;
        let opened = cameras
            .into_iter()
            .find(|c| c.id == camera.id)
            .ok_or_else(|| CameraError::OpenFailed(format!("device '{}' not found", camera.id)))?;

        log::info!("Opened FFmpeg camera {}", opened);
        Ok(Box::new(FfmpegHandle {
            ffmpeg: self.ffmpeg.clone(),
            format: self.format,
            descriptor: opened,
            open: true,
        }))
    }
}

struct FfmpegHandle {
    ffmpeg: PathBuf,
    format: InputFormat,
    descriptor: CameraDescriptor,
    open: bool,
}

#[async_trait]
impl CameraHandle for FfmpegHandle {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn is_ready(&self) -> bool {
        self.open
    }

    async fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.open {
            return Err(CameraError::NotReady);
        }

        let output = Command::new(&self.ffmpeg)
            .args(build_capture_args(self.format, &self.descriptor.id))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(map_ffmpeg_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        Ok(output.stdout)
    }

    async fn dispose(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_line_valid() {
        let line = "[AVFoundation indev @ 0x12345678] [0] FaceTime HD Camera";
        let (index, name) = parse_device_line(line).unwrap();
        assert_eq!(index, 0);
        assert_eq!(name, "FaceTime HD Camera");
    }

    #[test]
    fn test_parse_device_line_invalid() {
        assert!(parse_device_line("Some random line without device info").is_none());
    }

    #[test]
    fn test_parse_avfoundation_cameras_skips_screens_and_audio() {
        let stderr = r#"
[AVFoundation indev @ 0x123] AVFoundation video devices:
[AVFoundation indev @ 0x123] [0] FaceTime HD Camera
[AVFoundation indev @ 0x123] [1] Logitech BRIO
[AVFoundation indev @ 0x123] [2] Capture screen 0
[AVFoundation indev @ 0x123] AVFoundation audio devices:
[AVFoundation indev @ 0x123] [0] MacBook Pro Microphone
"#;
        let cameras = parse_avfoundation_cameras(stderr);
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].id, "FaceTime HD Camera");
        assert_eq!(cameras[0].lens_direction, LensDirection::Front);
        assert_eq!(cameras[1].lens_direction, LensDirection::External);
    }

    #[test]
    fn test_classify_name() {
        assert_eq!(classify_name("Integrated Camera"), LensDirection::Front);
        assert_eq!(classify_name("HD Pro Webcam C920"), LensDirection::External);
    }

    #[test]
    fn test_read_v4l2_cameras() {
        let root = tempfile::tempdir().unwrap();
        for (node, name) in [("video2", "HD Pro Webcam C920"), ("video0", "Integrated Camera")] {
            let dir = root.path().join(node);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("name"), format!("{}\n", name)).unwrap();
        }
        std::fs::create_dir_all(root.path().join("vbi0")).unwrap();

        let cameras = read_v4l2_cameras(root.path()).unwrap();
        assert_eq!(cameras.len(), 2);
        assert_eq!(cameras[0].id, "/dev/video0");
        assert_eq!(cameras[0].name, "Integrated Camera");
        assert_eq!(cameras[1].id, "/dev/video2");
        assert_eq!(cameras[1].lens_direction, LensDirection::External);
    }

    #[test]
    fn test_read_v4l2_missing_root() {
        let cameras = read_v4l2_cameras(Path::new("/definitely/not/here")).unwrap();
        assert!(cameras.is_empty());
    }

    #[test]
    fn test_build_capture_args_avfoundation() {
        let args = build_capture_args(InputFormat::AvFoundation, "FaceTime HD Camera");
        assert!(args.contains(&"avfoundation".to_string()));
        assert!(args.contains(&"-framerate".to_string()));
        assert!(args.contains(&"FaceTime HD Camera".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn test_build_capture_args_v4l2() {
        let args = build_capture_args(InputFormat::V4l2, "/dev/video0");
        assert!(args.contains(&"v4l2".to_string()));
        assert!(!args.contains(&"-framerate".to_string()));
        let frames = args.iter().position(|a| a == "-frames:v").unwrap();
        assert_eq!(args[frames + 1], "1");
    }

    #[test]
    fn test_map_ffmpeg_failure_permission() {
        assert!(matches!(
            map_ffmpeg_failure("Error: not authorized to capture video"),
            CameraError::PermissionDenied
        ));
        assert!(matches!(
            map_ffmpeg_failure("Input/output error"),
            CameraError::CaptureFailed(_)
        ));
    }

    #[tokio::test]
    async fn test_enumerate_v4l2_uses_sysfs_root() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("video0");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("name"), "USB Camera").unwrap();

        let driver = FfmpegCameraDriver::new()
            .with_format(InputFormat::V4l2)
            .with_sysfs_root(root.path());
        let cameras = driver.enumerate().await.unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].id, "/dev/video0");
    }

    #[tokio::test]
    async fn test_open_unknown_device_fails() {
        let root = tempfile::tempdir().unwrap();
        let driver = FfmpegCameraDriver::new()
            .with_format(InputFormat::V4l2)
            .with_sysfs_root(root.path());
        let requested = CameraDescriptor::new("/dev/video9", LensDirection::External);
        assert!(matches!(
            driver.open(&requested).await,
            Err(CameraError::OpenFailed(_))
        ));
    }
}
