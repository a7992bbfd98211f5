//! Cartridge patch files.
//!
//! A patch file is plain text. Lines starting with `-` are comments; every
//! other non-blank line is `ADDR: VAL [VAL…]`, all hexadecimal, the values
//! written into the ROM image starting at ADDR. Malformed lines are
//! skipped silently, matching what users expect from hand-edited files.

use std::fs;
use std::path::Path;

use thiserror::Error;
use vcs_core::paths;

use crate::cartridge::Cartridge;

const COMMENT_LEADER: char = '-';
const PATCH_DIR: &str = "patches";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch file error: {0}")]
    FileError(String),
    #[error("patch applied no bytes")]
    NothingApplied,
}

/// Apply patch text to a cartridge. Returns whether any byte was written.
pub fn apply(cart: &mut Cartridge, contents: &str) -> Result<bool, PatchError> {
    let mut patched = false;

    for line in contents.lines() {
        let Some(first) = line.chars().next() else {
            continue;
        };
        if first == COMMENT_LEADER || first.is_whitespace() {
            continue;
        }

        let Some((addr_part, values_part)) = line.split_once(':') else {
            continue;
        };
        let Ok(mut offset) = usize::from_str_radix(addr_part.trim(), 16) else {
            continue;
        };

        for value in values_part.split_whitespace() {
            let Ok(v) = u8::from_str_radix(value, 16) else {
                continue;
            };
            cart.patch(offset, v)
                .map_err(|e| PatchError::FileError(e.to_string()))?;
            patched = true;
            offset += 1;
        }
    }

    Ok(patched)
}

/// Load a patch from the resource directory (or a direct path) and apply
/// it.
pub fn apply_file(cart: &mut Cartridge, name: &str) -> Result<bool, PatchError> {
    let direct = Path::new(name);
    let path = if direct.is_file() {
        direct.to_path_buf()
    } else {
        paths::resource_path(&[PATCH_DIR, name])
    };

    let contents = fs::read_to_string(&path)
        .map_err(|e| PatchError::FileError(format!("{}: {}", path.display(), e)))?;
    apply(cart, &contents)
}
