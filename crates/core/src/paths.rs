//! Resource path resolution.
//!
//! All user-facing resources (patch files, recorded scripts, saved states)
//! live under a base directory named `.gopher2600`. A copy in the process
//! working directory takes precedence; otherwise the user's configuration
//! home is used.

use std::path::{Path, PathBuf};

const BASE_RESOURCE_DIR: &str = ".gopher2600";

/// Join `parts` onto the resolved base resource directory.
pub fn resource_path<P: AsRef<Path>>(parts: &[P]) -> PathBuf {
    let mut p = base_path();
    for part in parts {
        p.push(part);
    }
    p
}

fn base_path() -> PathBuf {
    let local = PathBuf::from(BASE_RESOURCE_DIR);
    if local.is_dir() {
        return local;
    }

    match config_home() {
        // the config-home copy drops the leading dot
        Some(home) => home.join(&BASE_RESOURCE_DIR[1..]),
        None => local,
    }
}

fn config_home() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return Some(PathBuf::from(xdg));
        }
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_path_joins_parts() {
        let p = resource_path(&["patches", "pitfall.pch"]);
        assert!(p.ends_with("patches/pitfall.pch"));
    }
}
