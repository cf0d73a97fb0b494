//! Components for a staged output tree.
//!
//! Every file under a staged directory gets a component in the install
//! directory matching its on-disk location. Unlike dependency components,
//! staged components are not de-duplicated across invocations and carry
//! random identifiers; only their install paths and any discovered module
//! identities feed the session, so later dependency walks treat the staged
//! binaries as already placed.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

use crate::emit::{CONDITION_ALWAYS, component_fragment, longpath};
use crate::naming;
use crate::resolve::ModuleReader;
use crate::session::Session;

pub struct StagedTreeRequest<'a> {
    /// Staged directory to mirror.
    pub target: &'a Path,
    /// Install directory for files at the top level of the staged tree.
    pub root_directory: &'a str,
    /// Prefix shared with the matching directory markup.
    pub prefix: &'a str,
    /// File extensions to leave out, `.ext` form.
    pub ignore_extensions: &'a [String],
    /// Dependency set receiving install paths and discovered identities.
    pub dependency_set: Option<&'a str>,
}

pub fn emit_staged_tree(
    reader: &dyn ModuleReader,
    out_dir: &Path,
    request: &StagedTreeRequest<'_>,
    session: &mut Session,
    out: &mut String,
) -> Result<()> {
    // Top-level files install into the caller-declared root directory and
    // keep deterministic, name-derived identifiers.
    for file in files_in(request.target)? {
        let file_name = lossy_file_name(&file);
        if is_ignored(&file_name, request.ignore_extensions) {
            continue;
        }

        let sanitized = naming::filter_junk(&file_name);
        let component_id = naming::limit_right(
            naming::ID_LIMIT,
            &format!("{}_{}C", request.prefix, sanitized),
        );
        let file_id =
            naming::limit_right(naming::ID_LIMIT, &format!("{}_{}", request.prefix, sanitized));

        out.push_str(&component_fragment(
            Some(request.root_directory),
            &component_id,
            &naming::new_upper_guid(),
            &file_id,
            &file.to_string_lossy(),
            CONDITION_ALWAYS,
        ));
    }

    let base = request.target.to_string_lossy().into_owned();
    walk(reader, out_dir, request, &base, request.target, session, out)
}

fn walk(
    reader: &dyn ModuleReader,
    out_dir: &Path,
    request: &StagedTreeRequest<'_>,
    base: &str,
    dir: &Path,
    session: &mut Session,
    out: &mut String,
) -> Result<()> {
    for child in directories_in(dir)? {
        let directory_id = naming::directory_id(base, request.prefix, &child);
        emit_directory_files(reader, out_dir, request, &child, &directory_id, session, out)?;
        walk(reader, out_dir, request, base, &child, session, out)?;
    }
    Ok(())
}

fn emit_directory_files(
    reader: &dyn ModuleReader,
    out_dir: &Path,
    request: &StagedTreeRequest<'_>,
    dir: &Path,
    directory_id: &str,
    session: &mut Session,
    out: &mut String,
) -> Result<()> {
    for file in files_in(dir)? {
        let file_name = lossy_file_name(&file);
        if is_ignored(&file_name, request.ignore_extensions) {
            continue;
        }

        let source = longpath::shorten(out_dir, &file)?;

        // Staged modules count as placed for later dependency walks.
        if file_name.ends_with(".wasm") {
            match reader.identity(&file) {
                Ok(identity) => {
                    session.components_mut(request.dependency_set).insert(identity);
                }
                Err(err) => warn!("staged module {} has no readable identity: {err:#}", file.display()),
            }
        }

        let install_target = format!("{directory_id}/{file_name}");
        if !session.paths_mut(request.dependency_set).insert(install_target) {
            continue;
        }

        out.push_str(&component_fragment(
            Some(directory_id),
            &format!("pubc{}", naming::new_upper_token()),
            &naming::new_upper_guid(),
            &format!("pub{}", naming::new_upper_token()),
            &source.to_string_lossy(),
            CONDITION_ALWAYS,
        ));
    }
    Ok(())
}

fn lossy_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_ignored(file_name: &str, ignore_extensions: &[String]) -> bool {
    ignore_extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
}

fn files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    entries_of_kind(dir, |is_dir| !is_dir)
}

fn directories_in(dir: &Path) -> Result<Vec<PathBuf>> {
    entries_of_kind(dir, |is_dir| is_dir)
}

fn entries_of_kind(dir: &Path, keep: fn(bool) -> bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed to list staged directory {}", dir.display()))?;
    let mut kept: Vec<_> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_type()
                .map(|kind| keep(kind.is_dir()))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect();
    kept.sort();
    Ok(kept)
}
