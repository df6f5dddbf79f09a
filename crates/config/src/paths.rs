//! Path utilities

use std::path::{Path, PathBuf};

/// Data directory (~/.claw), falling back to a relative `.claw` without a home
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".claw"))
        .unwrap_or_else(|| PathBuf::from(".claw"))
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Expand a leading `~` and make the path absolute against `base`.
///
/// The result is not canonicalized; the engine does that when a session starts.
pub fn resolve_root(root: &str, base: &Path) -> PathBuf {
    let expanded = if root == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(root))
    } else if let Some(rest) = root.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(root))
    } else {
        PathBuf::from(root)
    };

    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}
