//! Reads a compiled component's declared identity and references without
//! instantiating it.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::debug;
use wit_component::DecodedWasm;
use wit_parser::{PackageName, Resolve, WorldId, WorldKey};

use crate::identity::ModuleIdentity;

/// A declared dependency on another module, by name and version only; the
/// on-disk location is not known until resolution.
#[derive(Debug, Clone)]
pub struct ModuleRef {
    full_name: String,
}

impl ModuleRef {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }

    /// The declared `"ns:name, Version=x.y.z"` string.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// File-name guess for this reference: the declared name cut at the first
    /// space or comma, then the segment after the last `:`. Packages are
    /// stored on disk by short name, and `:` is not portable in file names.
    pub fn guessed_file_name(&self) -> &str {
        let head = match self.full_name.find([' ', ',']) {
            Some(idx) if idx >= 1 => &self.full_name[..idx],
            _ => self.full_name.as_str(),
        };
        head.rsplit(':').next().unwrap_or(head)
    }
}

/// Capability to read module metadata statically.
pub trait ModuleReader {
    /// The module's own identity. An unreadable file is a hard error.
    fn identity(&self, path: &Path) -> Result<ModuleIdentity>;

    /// The module's declared references. An unreadable file is a hard error;
    /// use [`ModuleReader::references`] for the tolerant form.
    fn try_references(&self, path: &Path) -> Result<Vec<ModuleRef>>;

    /// Tolerant wrapper: a module that cannot be parsed contributes no
    /// references instead of aborting the surrounding walk.
    fn references(&self, path: &Path) -> Vec<ModuleRef> {
        match self.try_references(path) {
            Ok(references) => references,
            Err(err) => {
                debug!("skipping unreadable module {}: {err:#}", path.display());
                Vec::new()
            }
        }
    }
}

/// Production reader for compiled WebAssembly components.
///
/// Identity comes from the component's own package; references are the
/// distinct packages of its imported interfaces.
#[derive(Debug, Default, Clone, Copy)]
pub struct WasmModuleReader;

impl ModuleReader for WasmModuleReader {
    fn identity(&self, path: &Path) -> Result<ModuleIdentity> {
        let (resolve, world_id) = decode_component(path)?;
        let world = &resolve.worlds[world_id];
        let package_id = world
            .package
            .with_context(|| format!("component {} declares no package", path.display()))?;
        let package = &resolve.packages[package_id];
        ModuleIdentity::from_file(path, &full_name(&package.name))
    }

    fn try_references(&self, path: &Path) -> Result<Vec<ModuleRef>> {
        let (resolve, world_id) = decode_component(path)?;
        let world = &resolve.worlds[world_id];

        let mut seen = HashSet::new();
        let mut references = Vec::new();
        for (key, _item) in &world.imports {
            let WorldKey::Interface(id) = key else {
                continue;
            };
            let interface = &resolve.interfaces[*id];
            let Some(package_id) = interface.package else {
                continue;
            };
            if Some(package_id) == world.package {
                continue;
            }
            let name = full_name(&resolve.packages[package_id].name);
            if seen.insert(name.clone()) {
                references.push(ModuleRef::new(name));
            }
        }
        Ok(references)
    }
}

fn full_name(name: &PackageName) -> String {
    format!(
        "{}:{}, Version={}",
        name.namespace,
        name.name,
        name.version
            .as_ref()
            .map(|version| version.to_string())
            .unwrap_or_else(|| "0.0.0".to_string())
    )
}

/// Decode a component's WIT metadata.
fn decode_component(path: &Path) -> Result<(Resolve, WorldId)> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read module {}", path.display()))?;
    ensure_component_layer(&bytes, path)?;

    let decoded = wit_component::decode(&bytes)
        .with_context(|| format!("failed to decode metadata from {}", path.display()))?;
    match decoded {
        DecodedWasm::Component(resolve, world_id) => Ok((resolve, world_id)),
        DecodedWasm::WitPackage(_, _) => {
            bail!(
                "{} is a WIT package, not a compiled component",
                path.display()
            )
        }
    }
}

/// Cheap header check so core modules and non-wasm files fail with a clear
/// message before full decoding.
fn ensure_component_layer(bytes: &[u8], path: &Path) -> Result<()> {
    for payload in wasmparser::Parser::new(0).parse_all(bytes) {
        let payload =
            payload.with_context(|| format!("{} is not a wasm binary", path.display()))?;
        return match payload {
            wasmparser::Payload::Version {
                encoding: wasmparser::Encoding::Component,
                ..
            } => Ok(()),
            _ => bail!("{} is not a component binary", path.display()),
        };
    }
    bail!("{} is empty", path.display())
}
