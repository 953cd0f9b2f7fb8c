use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use push_lib::notifications::settings::{default_settings_path, load_settings};
use push_lib::notifications::{PermissionStatus, Platform};
use push_lib::RunOptions;

/// Push notification service driven over a JSON-lines bridge on stdin/stdout
#[derive(Debug, Parser)]
#[command(name = "push-notifications", version)]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Key-value store file, overrides the settings file
    #[arg(long)]
    store: Option<PathBuf>,

    /// Platform used for permission gating
    #[arg(long, value_parser = parse_platform)]
    platform: Option<Platform>,

    /// OS API level (Android SDK int)
    #[arg(long)]
    api_level: Option<u32>,

    /// Deny the notification permission prompt
    #[arg(long)]
    deny_permission: bool,

    /// Device token reported when registration is requested
    #[arg(long)]
    device_token: Option<String>,
}

fn parse_platform(value: &str) -> Result<Platform, String> {
    match value.to_ascii_lowercase().as_str() {
        "android" => Ok(Platform::Android),
        "ios" => Ok(Platform::Ios),
        "desktop" => Ok(Platform::Desktop),
        other => Err(format!("unknown platform '{}' (expected android, ios or desktop)", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    // stdout carries the bridge protocol, so logs go to stderr
    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    log::info!("Starting push-notifications...");

    let settings_path = match cli.settings {
        Some(path) => path,
        None => default_settings_path().context("Failed to locate settings file")?,
    };
    let mut settings = load_settings(&settings_path)
        .await
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;

    if let Some(store) = cli.store {
        settings.store_path = Some(store);
    }
    if let Some(platform) = cli.platform {
        settings.platform = platform;
    }
    if let Some(api_level) = cli.api_level {
        settings.api_level = api_level;
    }

    let options = RunOptions {
        permission: if cli.deny_permission {
            PermissionStatus::Denied
        } else {
            PermissionStatus::Granted
        },
        device_token: cli.device_token,
    };

    let summary = push_lib::run(settings, options).await?;
    log::info!(
        "Exiting after {} requests ({} deliveries, {} errors)",
        summary.requests,
        summary.deliveries,
        summary.errors
    );
    Ok(())
}
