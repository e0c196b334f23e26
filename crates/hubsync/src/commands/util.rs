//! Shared helpers for command handlers.

use std::path::{Path, PathBuf};

use hubsync_config::Config;
use hubsync_core::{EngineConfig, MemoryStore, StoreError};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `HUBSYNC_CONFIG`, else the platform path.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(hubsync_config::config_path)
}

pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(hubsync_config::load_config_from(&config_file(global))?)
}

pub fn engine_config(global: &GlobalOpts) -> Result<EngineConfig, CliError> {
    let cfg = load_config(global)?;
    Ok(hubsync_config::to_engine_config(&cfg)?)
}

/// Open a tree file; a missing file is an empty tree.
pub fn open_tree(path: &Path) -> Result<MemoryStore, CliError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "tree file absent, starting empty");
        return Ok(MemoryStore::new());
    }
    let text = std::fs::read_to_string(path).map_err(|e| unavailable(path, &e))?;
    Ok(MemoryStore::from_json(&text)?)
}

pub fn save_tree(store: &MemoryStore, path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| unavailable(parent, &e))?;
    }
    std::fs::write(path, store.to_json()?).map_err(|e| unavailable(path, &e))?;
    Ok(())
}

fn unavailable(path: &Path, err: &std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {err}", path.display()))
}
