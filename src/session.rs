//! Cross-invocation session persistence.
//!
//! The host build invokes this tool once per compilation unit, so unique-item
//! tracking cannot live in process state. The tracked sets are persisted at
//! the build's output directory between invocations, with a short timeout and
//! an on-disk evidence check deciding whether a loaded session still belongs
//! to the build in progress.

use std::collections::{HashMap, HashSet};
use std::time::SystemTime;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::identity::ModuleIdentity;

pub const SESSION_FILE: &str = "session.txt";

/// Sessions untouched for longer than this belong to a finished build.
const STALE_AFTER_SECONDS: i64 = 5 * 60;

/// Extension of the per-unit outputs the downstream packager writes under
/// `<cwd>/obj`; their presence means a build is already underway.
const BUILD_OUTPUT_EXTENSION: &str = "pkgobj";

/// State shared by every invocation within one build: per-set collections of
/// emitted identities and of install paths already written to.
#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    write_time: DateTime<Utc>,
    components: HashMap<String, HashSet<ModuleIdentity>>,
    paths: HashMap<String, HashSet<String>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            write_time: Utc::now(),
            components: HashMap::new(),
            paths: HashMap::new(),
        }
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities already emitted for a dependency set, created on first use.
    pub fn components_mut(&mut self, set_name: Option<&str>) -> &mut HashSet<ModuleIdentity> {
        self.components.entry(set_key(set_name)).or_default()
    }

    /// Install paths already written for a dependency set, created on first use.
    pub fn paths_mut(&mut self, set_name: Option<&str>) -> &mut HashSet<String> {
        self.paths.entry(set_key(set_name)).or_default()
    }

    pub fn components(&self, set_name: Option<&str>) -> Option<&HashSet<ModuleIdentity>> {
        self.components.get(&set_key(set_name))
    }

    pub fn paths(&self, set_name: Option<&str>) -> Option<&HashSet<String>> {
        self.paths.get(&set_key(set_name))
    }

    fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.write_time).num_seconds() > STALE_AFTER_SECONDS
    }
}

fn set_key(set_name: Option<&str>) -> String {
    match set_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "default".to_string(),
    }
}

/// Loads and saves [`Session`] values at a session location.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// Skip the staleness policy and load whenever a session is present.
    /// For round-trip tests only.
    pub always_load: bool,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the session persisted at `location`.
    ///
    /// A missing directory or file yields an empty session. A session that is
    /// unreadable or stale wipes the location and also yields an empty one;
    /// it is never a fatal error.
    pub fn load(&self, location: &Path) -> Result<Session> {
        let file = location.join(SESSION_FILE);
        if !file.is_file() {
            return Ok(Session::new());
        }

        let session = match read_session(&file) {
            Ok(session) => session,
            Err(err) => {
                warn!("resetting unreadable session at {}: {err:#}", file.display());
                return reset_location(location);
            }
        };

        if !self.always_load {
            let working_dir = env::current_dir().context("cannot determine working directory")?;
            if no_build_outputs(&working_dir) || session.is_stale_at(Utc::now()) {
                debug!("session at {} is stale, starting fresh", location.display());
                return reset_location(location);
            }
        }

        Ok(session)
    }

    /// Serialize the whole session to `location`, stamping the write time.
    pub fn save(&self, location: &Path, session: &mut Session) -> Result<()> {
        fs::create_dir_all(location)
            .with_context(|| format!("failed to create session directory {}", location.display()))?;

        session.write_time = Utc::now();
        let body = serde_json::to_string(session).context("failed to serialize session")?;

        let file = location.join(SESSION_FILE);
        fs::write(&file, body)
            .with_context(|| format!("failed to write session {}", file.display()))
    }
}

fn read_session(file: &Path) -> Result<Session> {
    let body = fs::read_to_string(file)
        .with_context(|| format!("failed to read session {}", file.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse session {}", file.display()))
}

fn reset_location(location: &Path) -> Result<Session> {
    wipe_dir(location)
        .with_context(|| format!("failed to clear session location {}", location.display()))?;
    fs::create_dir_all(location)
        .with_context(|| format!("failed to recreate session location {}", location.display()))?;
    Ok(Session::new())
}

/// Recursive delete that strips write protection when a plain remove fails.
fn wipe_dir(target: &Path) -> io::Result<()> {
    for entry in fs::read_dir(target)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            wipe_dir(&path)?;
            fs::remove_dir(&path)?;
        } else {
            remove_file_forced(&path)?;
        }
    }
    fs::remove_dir(target)
}

fn remove_file_forced(path: &Path) -> io::Result<()> {
    if fs::remove_file(path).is_ok() {
        return Ok(());
    }
    let mut permissions = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(false);
    fs::set_permissions(path, permissions)?;
    fs::remove_file(path)
}

/// True when no previous unit of the current build has produced output yet,
/// i.e. this is the first invocation of a fresh build.
///
/// The downstream packager writes one output file per unit somewhere under
/// the most recently modified subdirectory of `<working_dir>/obj`.
fn no_build_outputs(working_dir: &Path) -> bool {
    let obj = working_dir.join("obj");
    let Ok(entries) = fs::read_dir(&obj) else {
        return true;
    };

    let mut subdirs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some((modified, entry.path()))
        })
        .collect();
    subdirs.sort_by(|a, b| b.0.cmp(&a.0));

    let Some((_, newest)) = subdirs.first() else {
        return true;
    };

    !WalkDir::new(newest)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == BUILD_OUTPUT_EXTENSION)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;

    fn identity(name: &str) -> ModuleIdentity {
        ModuleIdentity::from_file(
            &PathBuf::from(format!("/opt/app/{name}.wasm")),
            &format!("demo:{name}, Version=1.0.0"),
        )
        .unwrap()
    }

    #[test]
    fn save_then_load_round_trips_named_sets() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore { always_load: true };

        let mut session = Session::new();
        session.components_mut(None).insert(identity("one"));
        session.components_mut(None).insert(identity("two"));
        session.components_mut(Some("other")).insert(identity("three"));
        session.components_mut(Some("other")).insert(identity("four"));
        for set in [None, Some("other")] {
            for path in ["/one", "/two", "/three"] {
                session.paths_mut(set).insert(path.to_string());
            }
        }

        store.save(dir.path(), &mut session).unwrap();
        let loaded = store.load(dir.path()).unwrap();

        assert_eq!(loaded.components(None), session.components(None));
        assert_eq!(loaded.components(Some("other")), session.components(Some("other")));
        assert_eq!(loaded.paths(None), session.paths(None));
        assert_eq!(loaded.paths(Some("other")), session.paths(Some("other")));
    }

    #[test]
    fn missing_location_yields_an_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore { always_load: true };

        let session = store.load(&dir.path().join("nowhere")).unwrap();
        assert!(session.components(None).is_none());
    }

    #[test]
    fn unreadable_session_resets_the_location() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SESSION_FILE), "definitely not json").unwrap();
        fs::write(dir.path().join("leftover.bin"), b"stale artifact").unwrap();

        let store = SessionStore { always_load: true };
        let session = store.load(dir.path()).unwrap();

        assert!(session.components(None).is_none());
        assert!(dir.path().exists());
        assert!(!dir.path().join("leftover.bin").exists(), "location was wiped");
    }

    #[test]
    fn default_and_empty_set_names_share_a_key() {
        let mut session = Session::new();
        session.components_mut(Some("")).insert(identity("one"));

        assert_eq!(session.components(None).map(HashSet::len), Some(1));
        assert_eq!(session.components(Some("default")).map(HashSet::len), Some(1));
    }

    #[test]
    fn sessions_age_out_after_the_window() {
        let session = Session::new();
        let now = Utc::now();

        assert!(!session.is_stale_at(now));
        assert!(!session.is_stale_at(now + Duration::minutes(4)));
        assert!(session.is_stale_at(now + Duration::minutes(6)));
    }

    #[test]
    fn wipe_handles_readonly_and_nested_content() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("victim");
        let nested = root.join("deep").join("deeper");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("guarded.txt");
        fs::write(&file, b"x").unwrap();
        let mut permissions = fs::metadata(&file).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&file, permissions).unwrap();

        wipe_dir(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn no_outputs_when_obj_is_absent_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(no_build_outputs(dir.path()));

        fs::create_dir(dir.path().join("obj")).unwrap();
        assert!(no_build_outputs(dir.path()));
    }

    #[test]
    fn outputs_in_the_newest_unit_directory_count_as_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("obj").join("unit-a");
        fs::create_dir_all(&unit).unwrap();
        assert!(no_build_outputs(dir.path()), "no unit output yet");

        fs::write(unit.join("app.pkgobj"), b"").unwrap();
        assert!(!no_build_outputs(dir.path()));
    }

    #[test]
    fn evidence_is_read_from_the_most_recent_unit_directory() {
        let dir = tempfile::tempdir().unwrap();
        let older = dir.path().join("obj").join("older");
        fs::create_dir_all(&older).unwrap();
        fs::write(older.join("done.pkgobj"), b"").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        let newer = dir.path().join("obj").join("newer");
        fs::create_dir_all(&newer).unwrap();

        assert!(
            no_build_outputs(dir.path()),
            "only the newest unit directory is consulted"
        );
    }
}
