// Use modules from the library crate
use wasmstow::{emit, logging, naming, overlay, pragma, preprocess, resolve, session};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use emit::staged::{StagedTreeRequest, emit_staged_tree};
use emit::{CONDITION_ALWAYS, ComponentEmitter, ComponentRequest, component_fragment};
use pragma::PragmaContext;
use resolve::{ModuleReader, WasmModuleReader};
use session::{Session, SessionStore};

#[derive(Parser)]
#[command(
    name = "wasmstow",
    about = "Resolves WebAssembly component dependency closures and emits installer package fragments",
    version
)]
struct Cli {
    /// Per-build output directory: session location and long-path cache root
    ///
    /// The surrounding build passes the same directory to every invocation so
    /// uniqueness tracking carries across source units.
    #[arg(long, global = true, default_value = "pkgout", value_name = "DIR")]
    out_dir: PathBuf,

    /// Write fragments to a file instead of stdout
    #[arg(long, short = 'o', global = true, value_name = "FILE")]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Emit component fragments for modules and staged trees
    Components {
        #[command(subcommand)]
        command: ComponentsCommand,
    },

    /// Emit structural markup derived from on-disk trees
    Build {
        #[command(subcommand)]
        command: BuildCommand,
    },

    /// Expand <?stow prefix.name args?> directives in a source document
    ///
    /// This is the per-unit entry point used by the host build. Directives
    /// the tool does not recognize pass through untouched; failures inside a
    /// directive become inline <?error ...?> markers.
    Preprocess {
        /// Source document to expand
        source: PathBuf,
    },
}

#[derive(Subcommand)]
enum BuildCommand {
    /// Nested directory markup mirroring a directory tree
    ///
    /// Each directory id is the prefix plus the path from the target,
    /// sanitized, underscore-separated and upper case.
    Directories {
        /// Directory tree to mirror
        path: PathBuf,

        /// Identifier prefix for every emitted directory id
        #[arg(long, value_name = "PREFIX", default_value = "")]
        with_prefix: String,
    },
}

#[derive(Subcommand)]
enum ComponentsCommand {
    /// Dependency components; already-seen dependencies become copy fragments
    AllDeps(ComponentArgs),

    /// Dependency components; already-seen dependencies are suppressed
    UniqueDeps(ComponentArgs),

    /// The module and its dependencies; duplicates become copy fragments
    TargetWithAllDeps(ComponentArgs),

    /// The module and its not-yet-seen dependencies
    TargetWithUniqueDeps(ComponentArgs),

    /// Merge a profile overlay over a module's configuration and emit the
    /// merged file's component
    TransformedConfig {
        /// Module whose configuration is transformed
        module: PathBuf,

        /// Component identifier for the merged configuration file
        #[arg(long, value_name = "ID")]
        with_id: String,

        /// Build profile selecting the overlay file
        #[arg(long = "for", value_name = "PROFILE", default_value = "release")]
        profile: String,

        /// Install-directory token
        #[arg(long = "in", value_name = "DIR")]
        directory: Option<String>,
    },

    /// Components for every file in a staged output tree
    StagedTree {
        /// Staged directory to mirror
        path: PathBuf,

        /// Install directory for files at the top level of the tree
        #[arg(long, value_name = "DIR")]
        root_directory: String,

        /// Prefix shared with the matching directory markup
        #[arg(long, value_name = "PREFIX", default_value = "")]
        in_directories_with_prefix: String,

        /// File extensions to leave out, e.g. ".log;.tmp"
        #[arg(long, value_name = "EXTS", default_value = "")]
        ignore_extensions: String,

        /// Dependency set receiving install paths and identities
        #[arg(long, value_name = "NAME")]
        dependency_set: Option<String>,
    },
}

#[derive(Args)]
struct ComponentArgs {
    /// Module whose references are resolved
    module: PathBuf,

    /// Install-directory token for emitted components
    #[arg(long = "in", value_name = "DIR")]
    directory: Option<String>,

    /// Condition expression attached to each component
    #[arg(long = "if", value_name = "EXPR", default_value = CONDITION_ALWAYS)]
    condition: String,

    /// Dependency set tracking uniqueness across invocations
    #[arg(long, value_name = "NAME")]
    dependency_set: Option<String>,
}

fn main() -> Result<()> {
    // Logging is best-effort; a missing data directory must not block the
    // surrounding build.
    if let Err(err) = logging::init() {
        eprintln!("warning: logging disabled: {err:#}");
    }
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let reader = WasmModuleReader;
    let store = SessionStore::new();
    let mut session = store.load(&cli.out_dir)?;

    let mut out = String::new();
    dispatch(&cli.command, &reader, &cli.out_dir, &mut session, &mut out)?;

    store.save(&cli.out_dir, &mut session)?;

    match &cli.output {
        Some(path) => fs::write(path, &out)
            .with_context(|| format!("failed to write output {}", path.display()))?,
        None => print!("{out}"),
    }
    Ok(())
}

fn dispatch(
    command: &Command,
    reader: &dyn ModuleReader,
    out_dir: &Path,
    session: &mut Session,
    out: &mut String,
) -> Result<()> {
    match command {
        Command::Components { command } => components(command, reader, out_dir, session, out),

        Command::Build {
            command: BuildCommand::Directories { path, with_prefix },
        } => emit::directories::emit_directories(path, with_prefix.trim_end_matches('_'), out),

        Command::Preprocess { source } => {
            let body = fs::read_to_string(source)
                .with_context(|| format!("failed to read source document {}", source.display()))?;
            let mut ctx = PragmaContext {
                reader,
                out_dir,
                session,
            };
            let expanded = preprocess::expand_document(&mut ctx, &body);
            out.push_str(&expanded);
            Ok(())
        }
    }
}

fn components(
    command: &ComponentsCommand,
    reader: &dyn ModuleReader,
    out_dir: &Path,
    session: &mut Session,
    out: &mut String,
) -> Result<()> {
    let (args, copy_duplicates, include_target) = match command {
        ComponentsCommand::AllDeps(args) => (args, true, false),
        ComponentsCommand::UniqueDeps(args) => (args, false, false),
        ComponentsCommand::TargetWithAllDeps(args) => (args, true, true),
        ComponentsCommand::TargetWithUniqueDeps(args) => (args, false, true),

        ComponentsCommand::TransformedConfig {
            module,
            with_id,
            profile,
            directory,
        } => {
            let merged = overlay::transform(module, profile)?;
            out.push_str(&component_fragment(
                directory.as_deref(),
                with_id,
                &naming::new_upper_guid(),
                &format!("file_{with_id}"),
                &merged.to_string_lossy(),
                CONDITION_ALWAYS,
            ));
            return Ok(());
        }

        ComponentsCommand::StagedTree {
            path,
            root_directory,
            in_directories_with_prefix,
            ignore_extensions,
            dependency_set,
        } => {
            let ignore = naming::split_extensions(ignore_extensions);
            let request = StagedTreeRequest {
                target: path,
                root_directory,
                prefix: in_directories_with_prefix.trim_end_matches('_'),
                ignore_extensions: &ignore,
                dependency_set: dependency_set.as_deref(),
            };
            return emit_staged_tree(reader, out_dir, &request, session, out);
        }
    };

    let request = ComponentRequest {
        target: &args.module,
        directory: args.directory.as_deref(),
        condition: &args.condition,
        dependency_set: args.dependency_set.as_deref(),
        copy_duplicates,
        include_target,
    };
    ComponentEmitter::new(reader, out_dir).emit_components(&request, session, out)
}
