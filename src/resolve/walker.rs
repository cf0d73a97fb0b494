//! Transitive reference walk.
//!
//! Starting from a root module, every declared reference is resolved to a
//! file under the root's directory tree. References with no file under that
//! tree are assumed platform-provided and skipped; this search-path policy is
//! the contract, not a runtime query.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::identity::ModuleIdentity;
use crate::resolve::reader::{ModuleReader, ModuleRef};

/// Extensions a reference may resolve to, tried in order.
pub const MODULE_EXTENSIONS: &[&str] = &["wasm", "cwasm"];

pub struct ReferenceWalker<'a> {
    reader: &'a dyn ModuleReader,
}

impl<'a> ReferenceWalker<'a> {
    pub fn new(reader: &'a dyn ModuleReader) -> Self {
        Self { reader }
    }

    /// The transitive closure of `root`'s resolvable references, excluding
    /// the root itself. Each identity appears once; order is not significant.
    ///
    /// An unreadable root is a hard error. Unreadable referenced modules end
    /// their branch of the walk without failing the rest.
    pub fn dependencies(&self, root: &Path) -> Result<HashSet<ModuleIdentity>> {
        let base = root.parent().unwrap_or(Path::new("")).to_path_buf();
        let references = self
            .reader
            .try_references(root)
            .with_context(|| format!("cannot read references of {}", root.display()))?;

        let mut closure = HashSet::new();
        self.walk(&base, references, &mut closure);
        Ok(closure)
    }

    fn walk(&self, base: &Path, references: Vec<ModuleRef>, closure: &mut HashSet<ModuleIdentity>) {
        for reference in references {
            let Some(path) = resolve_reference(base, &reference) else {
                debug!(
                    "no file for {} under {}, treating as platform-provided",
                    reference.full_name(),
                    base.display()
                );
                continue;
            };

            let identity = match ModuleIdentity::from_file(&path, reference.full_name()) {
                Ok(identity) => identity,
                Err(err) => {
                    warn!("skipping reference {}: {err:#}", reference.full_name());
                    continue;
                }
            };

            // Already handled, possibly through a reference cycle.
            if !closure.insert(identity) {
                continue;
            }

            let next = self.reader.references(&path);
            self.walk(base, next, closure);
        }
    }
}

/// Resolve a declared reference to a file: direct children of `base` first,
/// then the first match anywhere beneath it.
fn resolve_reference(base: &Path, reference: &ModuleRef) -> Option<PathBuf> {
    let guess = reference.guessed_file_name();

    for extension in MODULE_EXTENSIONS {
        let direct = base.join(format!("{guess}.{extension}"));
        if direct.is_file() {
            return Some(direct);
        }
    }

    for extension in MODULE_EXTENSIONS {
        if let Some(found) = find_beneath(base, &format!("{guess}.{extension}")) {
            return Some(found);
        }
    }

    None
}

fn find_beneath(base: &Path, file_name: &str) -> Option<PathBuf> {
    WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(file_name)
        })
        .map(|entry| entry.into_path())
}
