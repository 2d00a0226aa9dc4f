//! Default on-disk locations for desktop hosts.

use bridge_traits::error::{BridgeError, Result};
use std::path::{Path, PathBuf};

/// Directory name used under the platform data directory.
pub const APP_DIR_NAME: &str = "collection-sync";

/// File name of the SQLite store holding the collection and resolver cache.
pub const DATABASE_FILE_NAME: &str = "collection.db";

/// Platform data directory for the application, e.g.
/// `~/.local/share/collection-sync` on Linux.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| {
            BridgeError::NotAvailable("No platform data directory available".to_string())
        })
}

/// Default export directory: the user's music folder, else the data dir.
pub fn default_export_dir() -> Result<PathBuf> {
    match dirs::audio_dir() {
        Some(dir) => Ok(dir.join(APP_DIR_NAME)),
        None => default_data_dir().map(|dir| dir.join("exports")),
    }
}

/// SQLite URL for the store inside `data_dir`, creating the directory.
pub fn database_url_in(data_dir: &Path) -> Result<String> {
    std::fs::create_dir_all(data_dir)?;
    Ok(format!(
        "sqlite:{}",
        data_dir.join(DATABASE_FILE_NAME).display()
    ))
}
