//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution. Every path
//! can be overridden with an environment variable for tests or custom
//! deployments:
//! - `MEANAI_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/meanai/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MEANAI_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("meanai"))
        .unwrap_or_else(|| PathBuf::from("/tmp/meanai-config"))
}

/// Path of the main config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
