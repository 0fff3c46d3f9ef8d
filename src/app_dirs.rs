//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/mouthpiece/` | `~/.local/share/mouthpiece/` |
//! | Config | `~/Library/Application Support/mouthpiece/` | `~/.config/mouthpiece/` |
//!
//! Overrides for tests and custom deployments:
//! - `MOUTHPIECE_DATA_DIR` overrides [`data_dir`]
//! - `MOUTHPIECE_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MOUTHPIECE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("mouthpiece"))
        .unwrap_or_else(|| PathBuf::from("/tmp/mouthpiece-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MOUTHPIECE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("mouthpiece"))
        .unwrap_or_else(|| PathBuf::from("/tmp/mouthpiece-config"))
}

/// Keyframe output directory (`data_dir()/public/`).
#[must_use]
pub fn public_dir() -> PathBuf {
    data_dir().join("public")
}
