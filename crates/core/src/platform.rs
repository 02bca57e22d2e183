//! Cross-platform paths.

use std::path::PathBuf;

/// Get the application data directory.
///
/// - Linux: `~/.local/share/ridechat`
/// - Windows: `%LOCALAPPDATA%\ridechat`
/// - macOS: `~/Library/Application Support/ridechat`
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ridechat")
}

/// Get the configuration directory.
///
/// - Linux: `~/.config/ridechat`
/// - Windows: `%APPDATA%\ridechat`
/// - macOS: `~/Library/Application Support/ridechat`
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ridechat")
}

/// Get the path to the main config file.
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Get the default directory for the shared key-value store.
pub fn store_dir() -> PathBuf {
    data_dir().join("store")
}
