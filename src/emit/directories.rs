//! Directory markup mirroring an on-disk tree.
//!
//! Each directory under the target gets a `<Directory>` element whose id is
//! the prefix plus the path from the target, sanitized, underscore-separated
//! and upper case, so install directories can be referenced by well-known
//! identifiers from other fragments.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::naming;

/// Emit nested directory markup for every directory beneath `target`.
pub fn emit_directories(target: &Path, prefix: &str, out: &mut String) -> Result<()> {
    let base = target.to_string_lossy().into_owned();
    walk(&base, target, prefix, out)
}

fn walk(base: &str, dir: &Path, prefix: &str, out: &mut String) -> Result<()> {
    for child in subdirectories(dir)? {
        let id = naming::directory_id(base, prefix, &child);
        let name = child
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        out.push_str(&format!("<Directory Id='{id}' Name='{name}'>"));
        walk(base, &child, prefix, out)?;
        out.push_str("</Directory>");
    }
    Ok(())
}

/// Sorted so emission order is stable across file systems.
fn subdirectories(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to list directory {}", dir.display()))?;
    let mut children: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();
    children.sort();
    Ok(children)
}
