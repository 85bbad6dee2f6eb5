//! Brace range patterns for batch folder creation.
//!
//! `build{1-3}` expands to `build1`, `build2`, `build3`. Text after the
//! closing brace is kept as a suffix, so `v{1-2}_old` yields `v1_old` and
//! `v2_old`. A reversed range such as `build{3-1}` expands to nothing.

use crate::{Result, StorageError};

/// Largest number of names a single pattern may expand to.
pub const MAX_PATTERN_EXPANSION: u64 = 10_000;

/// Expand a folder name that may contain a brace range.
///
/// Names without braces are returned unchanged.
///
/// # Examples
///
/// ```
/// use quotastore::storage::pattern::expand_names;
///
/// assert_eq!(expand_names("build{1-3}").unwrap(), vec!["build1", "build2", "build3"]);
/// assert!(expand_names("build{3-1}").unwrap().is_empty());
/// assert_eq!(expand_names("plain").unwrap(), vec!["plain"]);
/// ```
pub fn expand_names(name: &str) -> Result<Vec<String>> {
    if !name.contains('{') && !name.contains('}') {
        return Ok(vec![name.to_string()]);
    }

    let malformed = || StorageError::InvalidPattern(name.to_string());

    let open = name.find('{').ok_or_else(malformed)?;
    let close = name.find('}').ok_or_else(malformed)?;
    if close < open
        || name[open + 1..].contains('{')
        || name[close + 1..].contains('}')
    {
        return Err(malformed());
    }

    let prefix = &name[..open];
    let suffix = &name[close + 1..];
    let (start, end) = name[open + 1..close].split_once('-').ok_or_else(malformed)?;
    let start: u64 = start.trim().parse().map_err(|_| malformed())?;
    let end: u64 = end.trim().parse().map_err(|_| malformed())?;

    if start > end {
        return Ok(Vec::new());
    }
    if end - start >= MAX_PATTERN_EXPANSION {
        return Err(StorageError::InvalidPattern(format!(
            "{name} expands to more than {MAX_PATTERN_EXPANSION} names"
        )));
    }

    Ok((start..=end).map(|i| format!("{prefix}{i}{suffix}")).collect())
}
