//! Directive dispatch.
//!
//! The host addresses operations as `prefix.name` with one raw argument
//! string. Unrecognized prefixes and names are reported as unhandled so the
//! caller can pass them through; errors inside a handled operation become
//! inline error markers rather than aborting the surrounding build.

pub mod args;

use std::path::Path;

use anyhow::Result;
use tracing::warn;

use crate::emit::directories::emit_directories;
use crate::emit::staged::{StagedTreeRequest, emit_staged_tree};
use crate::emit::{CONDITION_ALWAYS, ComponentEmitter, ComponentRequest, component_fragment, error_marker};
use crate::naming;
use crate::overlay;
use crate::pragma::args::PragmaArgs;
use crate::resolve::ModuleReader;
use crate::session::Session;

pub struct PragmaContext<'a> {
    pub reader: &'a dyn ModuleReader,
    /// Session location and long-path cache root.
    pub out_dir: &'a Path,
    pub session: &'a mut Session,
}

/// Dispatch one directive. Returns `false` when the `prefix.name` pair is not
/// one of ours.
pub fn process(
    ctx: &mut PragmaContext<'_>,
    prefix: &str,
    name: &str,
    raw_args: &str,
    out: &mut String,
) -> bool {
    let args = PragmaArgs::parse(raw_args);
    let outcome = match prefix {
        "build" => build_op(name, &args, out),
        "components" => component_op(ctx, name, &args, out),
        _ => return false,
    };

    match outcome {
        Ok(handled) => handled,
        Err(err) => {
            warn!("directive {prefix}.{name} failed: {err:#}");
            error_marker(out, &format!("{prefix}.{name} failed: {err:#}"));
            true
        }
    }
}

fn build_op(name: &str, args: &PragmaArgs, out: &mut String) -> Result<bool> {
    match name {
        "directoriesMatching" => {
            let target = args.primary_required()?;
            let prefix = args.with_default("withPrefix", "").trim_end_matches('_');
            emit_directories(Path::new(target), prefix, out)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn component_op(
    ctx: &mut PragmaContext<'_>,
    name: &str,
    args: &PragmaArgs,
    out: &mut String,
) -> Result<bool> {
    match name {
        "allDependenciesOf" => components(ctx, args, out, true, false),
        "uniqueDependenciesOf" => components(ctx, args, out, false, false),
        "targetAndAllDependenciesOf" => components(ctx, args, out, true, true),
        "targetAndUniqueDependenciesOf" => components(ctx, args, out, false, true),
        "transformedConfigOf" => transformed_config(args, out),
        "stagedTreeIn" => staged_tree(ctx, args, out),
        _ => Ok(false),
    }
}

fn components(
    ctx: &mut PragmaContext<'_>,
    args: &PragmaArgs,
    out: &mut String,
    copy_duplicates: bool,
    include_target: bool,
) -> Result<bool> {
    let target = args.primary_required()?;
    let request = ComponentRequest {
        target: Path::new(target),
        directory: args.get("in"),
        condition: args.with_default("if", CONDITION_ALWAYS),
        dependency_set: args.get("dependencySet"),
        copy_duplicates,
        include_target,
    };

    ComponentEmitter::new(ctx.reader, ctx.out_dir).emit_components(&request, ctx.session, out)?;
    Ok(true)
}

fn transformed_config(args: &PragmaArgs, out: &mut String) -> Result<bool> {
    let module = args.primary_required()?;
    let directory = args.get("in");
    let profile = args.with_default("for", "release");
    let component_id = args.required("withId")?;

    let merged = overlay::transform(Path::new(module), profile)?;
    out.push_str(&component_fragment(
        directory,
        component_id,
        &naming::new_upper_guid(),
        &format!("file_{component_id}"),
        &merged.to_string_lossy(),
        CONDITION_ALWAYS,
    ));
    Ok(true)
}

fn staged_tree(ctx: &mut PragmaContext<'_>, args: &PragmaArgs, out: &mut String) -> Result<bool> {
    let target = args.primary_required()?;
    let prefix = args
        .with_default("inDirectoriesWithPrefix", "")
        .trim_end_matches('_');
    let root_directory = args.required("rootDirectory")?;
    let ignore_extensions = naming::split_extensions(args.with_default("ignoreExtensions", ""));

    let request = StagedTreeRequest {
        target: Path::new(target),
        root_directory,
        prefix,
        ignore_extensions: &ignore_extensions,
        dependency_set: args.get("dependencySet"),
    };
    emit_staged_tree(ctx.reader, ctx.out_dir, &request, ctx.session, out)?;
    Ok(true)
}
