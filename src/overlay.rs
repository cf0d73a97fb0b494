//! Configuration overlays for packaged modules.
//!
//! A module `app.wasm` ships with a runtime configuration `app.wasm.toml`.
//! Build profiles keep their differences in an overlay `config.<profile>.toml`
//! next to the module; at packaging time the overlay is merged over the base
//! and the merged file is what gets installed. The pre-merge file is kept
//! beside it as `<base>.original`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use toml::{Table, Value};

/// Merge the profile overlay over the module's base configuration, writing
/// the result back to the base path. Returns the path of the merged file.
///
/// Missing base or overlay files are hard errors; the surrounding build must
/// not package a half-configured module.
pub fn transform(module: &Path, profile: &str) -> Result<PathBuf> {
    let base = PathBuf::from(format!("{}.toml", module.display()));
    let overlay = module
        .parent()
        .unwrap_or(Path::new(""))
        .join(format!("config.{profile}.toml"));

    if !base.is_file() {
        bail!("expected to find \"{}\" but it was missing", base.display());
    }
    if !overlay.is_file() {
        bail!(
            "expected to find overlay at \"{}\" but it was missing",
            overlay.display()
        );
    }

    let original = PathBuf::from(format!("{}.original", base.display()));
    fs::copy(&base, &original)
        .with_context(|| format!("failed to back up {}", base.display()))?;

    let merged = merge_tables(read_table(&original)?, read_table(&overlay)?);
    let body = toml::to_string_pretty(&Value::Table(merged))
        .context("failed to serialize merged configuration")?;
    fs::write(&base, body)
        .with_context(|| format!("failed to write merged configuration {}", base.display()))?;

    Ok(base)
}

fn read_table(path: &Path) -> Result<Table> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    body.parse()
        .with_context(|| format!("failed to parse configuration {}", path.display()))
}

/// Tables merge recursively; scalars and arrays from the overlay replace the
/// base value.
fn merge_tables(mut base: Table, overlay: Table) -> Table {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                let merged = merge_tables(std::mem::take(existing), incoming);
                *existing = merged;
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
    base
}
