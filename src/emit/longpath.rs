//! Destination documents cap embedded source paths at roughly 250
//! characters. Paths within the cap pass through untouched; longer ones are
//! copied once into a cache directory under the session location and the
//! short cached path is embedded instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::debug;

/// Longest source path the destination format accepts.
pub const PATH_LIMIT: usize = 250;

/// Cache directory name under the session location.
pub const CACHE_DIR: &str = "longpath";

// Concurrent invocations may share one session location; the check-then-copy
// must not interleave.
static COPY_LOCK: Mutex<()> = Mutex::new(());

/// Return a path to `source` no longer than [`PATH_LIMIT`] characters,
/// copying into the cache when the absolute path exceeds the cap.
pub fn shorten(out_dir: &Path, source: &Path) -> Result<PathBuf> {
    let _guard = COPY_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    let absolute = std::path::absolute(source)
        .with_context(|| format!("cannot resolve absolute path of {}", source.display()))?;
    if absolute.as_os_str().len() <= PATH_LIMIT {
        return Ok(absolute);
    }

    let file_name = absolute
        .file_name()
        .with_context(|| format!("dependency {} has no file name", absolute.display()))?;

    let cache = out_dir.join(CACHE_DIR);
    fs::create_dir_all(&cache)
        .with_context(|| format!("failed to create long-path cache {}", cache.display()))?;

    let destination = cache.join(file_name);
    if !destination.exists() {
        debug!(
            "caching {} as {} to satisfy the path cap",
            absolute.display(),
            destination.display()
        );
        fs::copy(&absolute, &destination).with_context(|| {
            format!(
                "failed to copy {} into the long-path cache",
                absolute.display()
            )
        })?;
    }

    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paths_pass_through_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.wasm");
        fs::write(&file, b"payload").unwrap();

        let result = shorten(&dir.path().join("pkgout"), &file).unwrap();
        assert_eq!(result, file);
        assert!(!dir.path().join("pkgout").exists(), "no cache created");
    }

    fn deeply_nested_file(root: &Path) -> PathBuf {
        let mut dir = root.to_path_buf();
        while dir.as_os_str().len() < PATH_LIMIT + 20 {
            dir = dir.join("deeply-nested-directory-segment");
            fs::create_dir(&dir).unwrap();
        }
        let file = dir.join("lib.wasm");
        fs::write(&file, b"payload").unwrap();
        file
    }

    #[test]
    fn long_paths_are_copied_into_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("pkgout");
        let file = deeply_nested_file(dir.path());

        let result = shorten(&out_dir, &file).unwrap();

        assert_eq!(result, out_dir.join(CACHE_DIR).join("lib.wasm"));
        assert!(result.as_os_str().len() <= PATH_LIMIT);
        assert_eq!(fs::read(&result).unwrap(), b"payload");
    }

    #[test]
    fn existing_cache_entries_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("pkgout");
        let file = deeply_nested_file(dir.path());

        let first = shorten(&out_dir, &file).unwrap();
        fs::write(&first, b"already cached").unwrap();
        let second = shorten(&out_dir, &file).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            fs::read(&second).unwrap(),
            b"already cached",
            "no re-copy over an existing entry"
        );
    }
}
