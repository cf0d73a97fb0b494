//! Canonical module identity.
//!
//! A module is identified by its declared name and version plus the file it
//! resolved to, carried around as a single canonical key string of the form
//! `"ns:name, Version=1.2.3|/path/to/name.wasm"`. Equality and hashing go
//! through the derived component identifier rather than the raw key, so two
//! resolved copies of the same logical name and version collapse to one
//! identity even when the paths differ.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::naming;

#[derive(Debug, Clone)]
pub struct ModuleIdentity {
    key: String,
    version: f64,
}

impl ModuleIdentity {
    /// Build an identity from a resolved file and the raw identity string the
    /// referencing module declared (`"ns:name, Version=1.2.3"`; only the
    /// first two comma-separated segments are kept).
    ///
    /// Fails when the version declaration is absent or non-numeric.
    pub fn from_file(path: &Path, raw_identity: &str) -> Result<Self> {
        let bits: Vec<&str> = raw_identity.split(',').collect();
        let head = bits[..bits.len().min(2)].join(",");
        let key = format!("{head}|{}", path.display());

        let declaration = bits.get(1).with_context(|| {
            format!("module identity '{raw_identity}' has no version declaration")
        })?;
        let value = declaration.split('=').nth(1).with_context(|| {
            format!("module identity '{raw_identity}' has no version value")
        })?;
        let major_minor: String = value
            .trim()
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".");
        let version = major_minor.parse().with_context(|| {
            format!("module identity '{raw_identity}' has a non-numeric version")
        })?;

        Ok(Self { key, version })
    }

    /// Rebuild an identity from a previously serialized canonical key.
    ///
    /// The major.minor version is not recoverable from this form; consumers
    /// of round-tripped identities only need equality and the derived ids.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 0.0,
        }
    }

    /// Major.minor version as a single number, used only for ordering output.
    pub fn version(&self) -> f64 {
        self.version
    }

    /// Stable component identifier, bounded at [`naming::ID_LIMIT`].
    pub fn component_id(&self) -> String {
        component_id_for(&self.key, "")
    }

    /// Component identifier carrying a dependency-set suffix, so identical
    /// binaries tracked under different named sets stay distinguishable.
    pub fn component_id_in(&self, set_name: &str) -> String {
        component_id_for(&self.key, set_name)
    }

    /// Stable file identifier, bounded at [`naming::ID_LIMIT`].
    pub fn file_id(&self) -> String {
        file_id_for(&self.key, "")
    }

    /// File identifier carrying a dependency-set suffix.
    pub fn file_id_in(&self, set_name: &str) -> String {
        file_id_for(&self.key, set_name)
    }

    /// Resolved on-disk location.
    pub fn file_path(&self) -> &str {
        self.key.split('|').nth(1).unwrap_or("")
    }

    /// Bare file name of the resolved location.
    pub fn file_name(&self) -> String {
        Path::new(self.file_path())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Sanitized `name_version` stem shared by the component and file ids.
fn id_stem(key: &str) -> String {
    let head = key.split('|').next().unwrap_or("");
    naming::filter_junk(&head.replace(", Version=", "_"))
}

fn suffixed(stem: String, set_name: &str) -> String {
    if set_name.is_empty() {
        stem
    } else {
        format!("{stem}_{}", naming::filter_junk(set_name))
    }
}

pub fn component_id_for(key: &str, set_name: &str) -> String {
    naming::limit_right(
        naming::ID_LIMIT,
        &suffixed(format!("cmp_{}", id_stem(key)), set_name),
    )
}

pub fn file_id_for(key: &str, set_name: &str) -> String {
    naming::limit_right(
        naming::ID_LIMIT,
        &suffixed(format!("file_{}", id_stem(key)), set_name),
    )
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl PartialEq for ModuleIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.component_id() == other.component_id()
    }
}

impl Eq for ModuleIdentity {}

impl Hash for ModuleIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.component_id().hash(state);
    }
}

impl Serialize for ModuleIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

impl<'de> Deserialize<'de> for ModuleIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Ok(Self::from_key(key))
    }
}
