//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::DeviceClassArg;

/// Kiosk photo booth: capture a photo and send it to an AI session
#[derive(Parser, Debug)]
#[command(name = "photobooth")]
#[command(version, about = "Kiosk photo booth capture and upload", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured device class
    #[arg(long, global = true)]
    pub device_class: Option<DeviceClassArg>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras in display order
    ListCameras {
        /// Show every camera the driver reports, before deduplication and filtering
        #[arg(long)]
        all: bool,
    },
    /// Count down and capture a photo
    Capture {
        /// Camera id (default: the preferred camera)
        #[arg(long)]
        camera: Option<String>,
        /// Countdown length in seconds (default: from config)
        #[arg(long)]
        countdown: Option<u32>,
        /// Write the JPEG here
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Do not keep a copy in the photo cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Upload an image file to an existing session
    Upload {
        /// Image file to normalize and upload
        file: PathBuf,
        /// Session id
        #[arg(long, short)]
        session: String,
    },
    /// Full booth flow: create a session, capture, upload and fetch the result
    Run {
        /// Theme id for the new session
        #[arg(long, short)]
        theme: String,
        /// Camera id (default: the preferred camera)
        #[arg(long)]
        camera: Option<String>,
        /// Countdown length in seconds (default: from config)
        #[arg(long)]
        countdown: Option<u32>,
        /// Use this image instead of the camera
        #[arg(long)]
        photo: Option<PathBuf>,
        /// Where to save the transformed result
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Seconds to wait for the result (0 = don't wait)
        #[arg(long, default_value = "120")]
        wait: u64,
    },
    /// List the available themes
    Themes,
    /// Download the transformed result of a session
    FetchResult {
        /// Session id
        #[arg(long, short)]
        session: String,
        /// Where to save the result
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Seconds to wait for the result to become available
        #[arg(long, default_value = "0")]
        wait: u64,
    },
    /// Manage cached photos
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// List cached photos with their sizes
    List,
    /// Remove one cached photo, or all of them
    Clear {
        /// Hash of the photo to remove (default: all)
        hash: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
