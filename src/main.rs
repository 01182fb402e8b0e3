use clap::Parser;

use photobooth::api::API_KEY_ENV;
use photobooth::cli::{self, Args};
use photobooth::config::Config;

/// Warn when requests will go out without an API key.
fn check_api_key() {
    if std::env::var(API_KEY_ENV).is_err() {
        log::warn!(
            "{} not set, session API requests will be unauthenticated",
            API_KEY_ENV
        );
    }
}

fn main() {
    // Load .env before the logger so RUST_LOG from it applies.
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    check_api_key();

    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = rt.block_on(cli::dispatch(args, config)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
