//! Initialize the configuration directory: create ~/.claudette, default config, workspace and
//! data directory.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config;

/// Create the config directory and default files if they do not exist.
/// - Writes `config.json` with `{}` if missing.
/// - Creates the tool workspace and the conversation data directory.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        std::fs::write(config_path, b"{}")
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    for dir in [
        config::resolve_workspace_dir(&config, config_path),
        config::resolve_storage_dir(&config, config_path),
    ] {
        if dir.exists() {
            log::debug!("{} already exists, skipping", dir.display());
            continue;
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        log::info!("created {}", dir.display());
    }

    Ok(config_dir)
}
