pub mod check;
pub mod config;
pub mod run;

use std::path::{Path, PathBuf};

use tracing::debug;

use sheetocr_core::SheetOcrConfig;

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sheetocr")
        .join("config.json")
}

/// The `--config` path if given, otherwise the default location.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load configuration, falling back to defaults when the file is absent.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<SheetOcrConfig> {
    let path = config_path(explicit);
    if explicit.is_some() || path.exists() {
        debug!("Loading configuration from {}", path.display());
        load_from(&path)
    } else {
        Ok(SheetOcrConfig::default())
    }
}

fn load_from(path: &Path) -> anyhow::Result<SheetOcrConfig> {
    SheetOcrConfig::from_file(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))
}
