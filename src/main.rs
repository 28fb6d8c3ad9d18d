mod audio;
mod cli;
mod config;
mod error;
mod particles;
mod pipeline;
mod render;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use cli::Cli;
use config::Config;
use pipeline::ProjectPaths;

/// `sonoframe.toml` in the working directory, then the user config directories.
fn discover_config() -> Option<PathBuf> {
    let local = PathBuf::from("sonoframe.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonoframe").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonoframe").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let cfg = config::load_config(path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => match discover_config() {
            Some(path) => match config::load_config(&path) {
                Ok(cfg) => {
                    log::info!("Loaded config from {}", path.display());
                    cfg
                }
                Err(e) => {
                    log::warn!("Ignoring config {}: {:#}", path.display(), e);
                    Config::default()
                }
            },
            None => Config::default(),
        },
    };
    cli.apply_overrides(&mut config);

    let paths = ProjectPaths::resolve(&cli.project, cli.common.as_deref(), cli.fonts.as_deref());
    log::info!("sonoframe - audio-driven frame renderer");
    log::info!("Project: {}", paths.project.display());
    log::info!("Common: {}", paths.common.display());
    log::info!(
        "Resolution: {}x{} @ {}fps, {:?} layout",
        config.output.width,
        config.output.height,
        config.output.fps,
        config.layout.variant
    );

    let summary = pipeline::run(paths, config)?;
    log::info!(
        "Done: {} frames ({:.2}s of audio)",
        summary.frame_count,
        summary.duration_secs
    );
    Ok(())
}
