//! Identifier hygiene for the destination package format.
//!
//! Destination documents put hard constraints on identifiers: they must be
//! valid in file systems and installer databases, and they must not exceed a
//! fixed length. Identifiers are right-truncated rather than left-truncated
//! because names inside one namespace tend to share long prefixes, so the tail
//! carries the distinguishing part.

use std::path::Path;

use uuid::Uuid;

/// Hard length bound for component and file identifiers.
pub const ID_LIMIT: usize = 70;

/// Hard length bound for directory identifiers.
pub const DIRECTORY_ID_LIMIT: usize = 72;

/// Replace every character that is invalid in a file system name, plus
/// space, hyphen and period, with an underscore.
///
/// Repeated underscores are deliberately kept; callers that want them
/// collapsed (directory ids) do so themselves.
pub fn filter_junk(src: &str) -> String {
    src.chars()
        .map(|ch| if is_junk(ch) { '_' } else { ch })
        .collect()
}

fn is_junk(ch: char) -> bool {
    matches!(
        ch,
        '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/' | ' ' | '-' | '.'
    ) || ch.is_control()
}

/// Keep the rightmost `limit` characters of `src`.
///
/// Inputs already within the bound are returned unchanged.
pub fn limit_right(limit: usize, src: &str) -> String {
    let length = src.chars().count();
    if length <= limit {
        return src.to_string();
    }
    src.chars().skip(length - limit).collect()
}

/// Well-known identifier for a directory under `base`, formed by substituting
/// `prefix` for the base path, sanitizing, uppercasing, and folding doubled
/// underscores. Bounded at [`DIRECTORY_ID_LIMIT`].
pub fn directory_id(base: &str, prefix: &str, dir: &Path) -> String {
    let substituted = dir
        .to_string_lossy()
        .replace(base.trim_end_matches(['/', '\\']), prefix);
    limit_right(
        DIRECTORY_ID_LIMIT,
        &filter_junk(&substituted).to_uppercase().replace("__", "_"),
    )
}

/// Fresh instance token: a hyphenated UUID, upper case.
pub fn new_upper_guid() -> String {
    Uuid::new_v4().to_string().to_uppercase()
}

/// Fresh identifier suffix: `_` plus 32 hex digits, upper case.
pub fn new_upper_token() -> String {
    format!("_{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Split an extension list such as `".log;.tmp"` or `"log, tmp"` into
/// normalized `.ext` entries.
pub fn split_extensions(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .map(|ext| {
            if ext.starts_with('.') {
                ext.to_string()
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}
