//! Path confinement for tool arguments
//!
//! Every path a tool touches must stay under the session root. Paths are
//! normalized lexically first, then the deepest existing ancestor is
//! canonicalized so symlinks cannot be used to step outside.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use super::ToolError;

/// Resolve `raw` against `root` (canonical) and ensure it stays inside.
pub fn resolve_in_root(raw: &str, root: &Path) -> Result<PathBuf, ToolError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ToolError::Validation("path must not be empty".to_string()));
    }

    let expanded = expand_tilde(trimmed);
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        root.join(expanded)
    };

    let escape = || ToolError::PathEscape {
        path: raw.to_string(),
        root: root.display().to_string(),
    };

    let normalized = normalize(&joined).ok_or_else(escape)?;
    if !is_within_root(&normalized, root) {
        return Err(escape());
    }

    let resolved = canonicalize_existing_prefix(&normalized).ok_or_else(escape)?;
    if !is_within_root(&resolved, root) {
        return Err(escape());
    }

    Ok(resolved)
}

/// Lexically resolve `.` and `..`; `None` if `..` climbs above the top
pub fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                _ => return None,
            },
            Component::Normal(name) => out.push(name),
        }
    }
    Some(out)
}

/// Canonicalize the deepest ancestor that exists and re-append the rest.
///
/// A dangling symlink anywhere on the way yields `None`: its target cannot
/// be checked.
fn canonicalize_existing_prefix(path: &Path) -> Option<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match std::fs::canonicalize(&existing) {
            Ok(mut canonical) => {
                for name in missing.iter().rev() {
                    canonical.push(name);
                }
                return Some(canonical);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if std::fs::symlink_metadata(&existing).is_ok() {
                    return None;
                }
                let name = existing.file_name()?.to_os_string();
                missing.push(name);
                existing = existing.parent()?.to_path_buf();
            }
            Err(_) => return None,
        }
    }
}

/// Component-wise prefix check
fn is_within_root(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Expand tilde (~) to home directory
fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Path relative to `root` for display, `.` for the root itself
pub fn display_relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}
