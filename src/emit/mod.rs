//! Fragment emission for resolved dependency closures.
//!
//! Fragments are pre-formatted markup strings handed to the destination
//! document writer. Two shapes exist: a component with an explicit install
//! directory and one without (default placement); which one is used depends
//! only on whether the caller supplied a directory token.

pub mod directories;
pub mod longpath;
pub mod staged;

use std::path::Path;

use anyhow::Result;
use tracing::debug;

use crate::identity::ModuleIdentity;
use crate::naming;
use crate::resolve::{ModuleReader, ReferenceWalker};
use crate::session::Session;

/// Condition expression meaning "always install".
pub const CONDITION_ALWAYS: &str = "1";

/// Render one component fragment.
pub fn component_fragment(
    directory: Option<&str>,
    id: &str,
    guid: &str,
    file_id: &str,
    source: &str,
    condition: &str,
) -> String {
    match directory {
        Some(directory) => format!(
            "<Component Id='{id}' Guid='{guid}' Directory='{directory}'>\
             <Condition><![CDATA[{condition}]]></Condition>\
             <File Id='{file_id}' Source='{source}' KeyPath='yes'/></Component>"
        ),
        None => format!(
            "<Component Id='{id}' Guid='{guid}'>\
             <Condition><![CDATA[{condition}]]></Condition>\
             <File Id='{file_id}' Source='{source}' KeyPath='yes'/></Component>"
        ),
    }
}

/// Inline error marker surfaced through the output stream, so the host build
/// reports the problem instead of this tool crashing the whole run.
pub fn error_marker(out: &mut String, message: &str) {
    out.push_str("<?error wasmstow: ");
    out.push_str(message);
    out.push_str(" ?>");
}

/// One component-emission request, as supplied by the host per directive.
pub struct ComponentRequest<'a> {
    /// Module whose references are resolved.
    pub target: &'a Path,
    /// Install-directory token; `None` means default placement.
    pub directory: Option<&'a str>,
    /// Condition expression attached to each emitted component.
    pub condition: &'a str,
    /// Named dependency set tracking uniqueness across invocations.
    pub dependency_set: Option<&'a str>,
    /// Re-emit already-seen identities as lightweight copy fragments.
    pub copy_duplicates: bool,
    /// Also emit a component for the target module itself.
    pub include_target: bool,
}

pub struct ComponentEmitter<'a> {
    reader: &'a dyn ModuleReader,
    out_dir: &'a Path,
}

impl<'a> ComponentEmitter<'a> {
    pub fn new(reader: &'a dyn ModuleReader, out_dir: &'a Path) -> Self {
        Self { reader, out_dir }
    }

    /// Emit component fragments for the target's dependency closure,
    /// highest version first, one fragment per identity not yet seen in the
    /// request's dependency set.
    ///
    /// A missing target is reported as an inline error marker; the session
    /// sets are mutated in memory and persisted by the caller.
    pub fn emit_components(
        &self,
        request: &ComponentRequest<'_>,
        session: &mut Session,
        out: &mut String,
    ) -> Result<()> {
        if !request.target.is_file() {
            error_marker(
                out,
                &format!("could not find path {}", request.target.display()),
            );
            return Ok(());
        }

        let walker = ReferenceWalker::new(self.reader);
        let mut dependencies: Vec<ModuleIdentity> =
            walker.dependencies(request.target)?.into_iter().collect();
        if request.include_target {
            dependencies.push(self.reader.identity(request.target)?);
        }

        dependencies.sort_by(|a, b| b.version().total_cmp(&a.version()));
        debug!(
            "emitting {} dependencies of {}",
            dependencies.len(),
            request.target.display()
        );

        let set_suffix = request.dependency_set.unwrap_or("");
        for dependency in dependencies {
            // Two different files must never land on one install location.
            let install_target = format!(
                "{}/{}",
                request.directory.unwrap_or(""),
                dependency.file_name()
            );
            if !session
                .paths_mut(request.dependency_set)
                .insert(install_target)
            {
                continue;
            }

            let components = session.components_mut(request.dependency_set);
            if components.contains(&dependency) {
                if request.copy_duplicates {
                    self.write_copy(out, &dependency, request, set_suffix)?;
                }
            } else {
                components.insert(dependency.clone());
                self.write_original(out, &dependency, request, set_suffix)?;
            }
        }

        Ok(())
    }

    fn write_original(
        &self,
        out: &mut String,
        dependency: &ModuleIdentity,
        request: &ComponentRequest<'_>,
        set_suffix: &str,
    ) -> Result<()> {
        let source = longpath::shorten(self.out_dir, Path::new(dependency.file_path()))?;
        out.push_str(&component_fragment(
            request.directory,
            &dependency.component_id_in(set_suffix),
            &naming::new_upper_guid(),
            &dependency.file_id_in(set_suffix),
            &source.to_string_lossy(),
            request.condition,
        ));
        Ok(())
    }

    /// Duplicate logical content still needs globally unique identifiers in
    /// the destination package, so copies get a fresh token suffix.
    fn write_copy(
        &self,
        out: &mut String,
        dependency: &ModuleIdentity,
        request: &ComponentRequest<'_>,
        set_suffix: &str,
    ) -> Result<()> {
        let source = longpath::shorten(self.out_dir, Path::new(dependency.file_path()))?;
        let component_id = naming::limit_right(
            naming::ID_LIMIT,
            &format!(
                "{}{}",
                dependency.component_id_in(set_suffix),
                naming::new_upper_token()
            ),
        )
        .to_uppercase();
        let file_id = naming::limit_right(
            naming::ID_LIMIT,
            &format!(
                "{}{}",
                dependency.file_id_in(set_suffix),
                naming::new_upper_token()
            ),
        )
        .to_uppercase();

        out.push_str(&component_fragment(
            request.directory,
            &component_id,
            &naming::new_upper_guid(),
            &file_id,
            &source.to_string_lossy(),
            request.condition,
        ));
        Ok(())
    }
}
