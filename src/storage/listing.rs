//! Directory listings.
//!
//! A listing is produced in two stages. [`Walk`] lazily visits the tree
//! depth-first in name order, emitting each directory before its children.
//! [`Listing`] then applies the requested filter or sort on top of it.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::vec;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::layout;
use crate::datetime::{format_listing_time, to_utc};
use crate::Result;

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file or anything that is not a directory.
    File,
    /// Directory.
    Dir,
}

impl EntryKind {
    /// Label used in summary lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "FILE",
            EntryKind::Dir => "DIR",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

impl Order {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Ascending => ordering,
            Order::Descending => ordering.reverse(),
        }
    }
}

/// What a listing shows and in which order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ListMode {
    /// Every entry in walk order.
    #[default]
    All,
    /// Files whose name ends with the given suffix, ignoring case.
    FilterExtension(String),
    /// Files whose name contains the given text.
    FilterName(String),
    /// All entries sorted by name, ignoring case.
    SortByName(Order),
    /// All entries sorted by modification time, shown with the time.
    SortByModified(Order),
}

/// Options for [`Storage::list`](super::Storage::list).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Filter or sort to apply.
    pub mode: ListMode,
}

impl ListOptions {
    /// List one directory level in walk order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Walk the whole subtree.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    /// Set the filter or sort mode.
    pub fn mode(mut self, mode: ListMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One listed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// File name.
    pub name: String,
    /// Path relative to the storage root, `/`-separated.
    pub relative_path: String,
    /// Absolute path.
    pub absolute_path: PathBuf,
    /// Size in bytes; directories report 0.
    pub size_bytes: u64,
    /// File or directory.
    pub kind: EntryKind,
    /// Last modification time, if the platform reports one.
    pub modified: Option<DateTime<Utc>>,
}

impl ListEntry {
    /// Read an entry from disk without following symlinks.
    pub fn from_path(root: &Path, path: &Path) -> io::Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            relative_path: layout::display_relative(root, path),
            absolute_path: path.to_path_buf(),
            size_bytes: if kind == EntryKind::Dir { 0 } else { meta.len() },
            kind,
            modified: meta.modified().ok().map(to_utc),
        })
    }

    /// Size in whole kilobytes, rounded down.
    pub fn size_kb(&self) -> u64 {
        self.size_bytes / 1024
    }

    /// Render as `name --- N KB --- KIND`.
    pub fn summary_line(&self) -> String {
        format!("{} --- {} KB --- {}", self.name, self.size_kb(), self.kind)
    }

    /// Render as a summary line followed by the modification time in `tz`.
    pub fn summary_line_with_time(&self, tz: &Tz) -> String {
        match &self.modified {
            Some(modified) => format!(
                "{} --- {}",
                self.summary_line(),
                format_listing_time(modified, tz)
            ),
            None => self.summary_line(),
        }
    }
}

type DescendFilter = Box<dyn FnMut(&Path) -> bool + Send>;

fn read_sorted(dir: &Path) -> io::Result<vec::IntoIter<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths.into_iter())
}

/// Lazy depth-first walk of a storage directory.
///
/// The persisted records are skipped. Directories rejected by the descend
/// filter are still emitted but their children are not visited.
pub struct Walk {
    root: PathBuf,
    stack: Vec<vec::IntoIter<PathBuf>>,
    recursive: bool,
    can_descend: DescendFilter,
}

impl Walk {
    /// Start walking `dir`, which must lie inside `root`.
    pub fn new(
        root: impl Into<PathBuf>,
        dir: &Path,
        recursive: bool,
        can_descend: impl FnMut(&Path) -> bool + Send + 'static,
    ) -> io::Result<Self> {
        Ok(Self {
            root: root.into(),
            stack: vec![read_sorted(dir)?],
            recursive,
            can_descend: Box::new(can_descend),
        })
    }
}

impl fmt::Debug for Walk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Walk")
            .field("root", &self.root)
            .field("depth", &self.stack.len())
            .field("recursive", &self.recursive)
            .finish()
    }
}

impl Iterator for Walk {
    type Item = Result<ListEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            let Some(path) = level.next() else {
                self.stack.pop();
                continue;
            };
            if layout::is_record(&self.root, &path) {
                continue;
            }

            let entry = match ListEntry::from_path(&self.root, &path) {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if self.recursive && entry.kind == EntryKind::Dir && (self.can_descend)(&path) {
                match read_sorted(&path) {
                    Ok(children) => self.stack.push(children),
                    Err(e) => return Some(Err(e.into())),
                }
            }
            return Some(Ok(entry));
        }
    }
}

fn compare_entries(mode: &ListMode, a: &ListEntry, b: &ListEntry) -> Ordering {
    match mode {
        ListMode::SortByName(order) => {
            order.apply(a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        }
        ListMode::SortByModified(order) => order.apply(a.modified.cmp(&b.modified)),
        _ => Ordering::Equal,
    }
}

/// A listing: a walk with its filter or sort applied.
///
/// Filtering modes stay lazy. Sorting modes drain the walk on first use.
pub struct Listing {
    entries: Box<dyn Iterator<Item = Result<ListEntry>> + Send>,
    timezone: Tz,
    show_modified: bool,
}

impl Listing {
    /// Apply `mode` to `walk`.
    pub fn new(walk: Walk, mode: ListMode, timezone: Tz) -> Self {
        let show_modified = matches!(mode, ListMode::SortByModified(_));
        let entries: Box<dyn Iterator<Item = Result<ListEntry>> + Send> = match mode {
            ListMode::All => Box::new(walk),
            ListMode::FilterExtension(suffix) => {
                let suffix = suffix.to_lowercase();
                Box::new(walk.filter(move |item| match item {
                    Ok(entry) if entry.kind == EntryKind::File => {
                        entry.name.to_lowercase().ends_with(&suffix)
                    }
                    _ => true,
                }))
            }
            ListMode::FilterName(needle) => Box::new(walk.filter(move |item| match item {
                Ok(entry) if entry.kind == EntryKind::File => entry.name.contains(&needle),
                _ => true,
            })),
            sort @ (ListMode::SortByName(_) | ListMode::SortByModified(_)) => {
                let mut pending = Some(walk);
                let mut sorted = Vec::new().into_iter();
                Box::new(std::iter::from_fn(move || {
                    if let Some(walk) = pending.take() {
                        let mut collected = match walk.collect::<Result<Vec<_>>>() {
                            Ok(collected) => collected,
                            Err(e) => return Some(Err(e)),
                        };
                        collected.sort_by(|a, b| compare_entries(&sort, a, b));
                        sorted = collected.into_iter();
                    }
                    sorted.next().map(Ok)
                }))
            }
        };

        Self {
            entries,
            timezone,
            show_modified,
        }
    }

    /// Render the remaining entries as summary lines.
    pub fn lines(self) -> Result<Vec<String>> {
        let timezone = self.timezone;
        let show_modified = self.show_modified;
        self.map(|item| {
            item.map(|entry| {
                if show_modified {
                    entry.summary_line_with_time(&timezone)
                } else {
                    entry.summary_line()
                }
            })
        })
        .collect()
    }
}

impl fmt::Debug for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listing")
            .field("timezone", &self.timezone)
            .field("show_modified", &self.show_modified)
            .finish()
    }
}

impl Iterator for Listing {
    type Item = Result<ListEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(layout::CONFIG_FILE), "{}").unwrap();
        fs::write(root.join(layout::USERS_FILE), "[]").unwrap();
        fs::write(root.join("b.txt"), vec![0u8; 2048]).unwrap();
        fs::write(root.join("A.log"), "log").unwrap();
        fs::create_dir_all(root.join("docs/inner")).unwrap();
        fs::write(root.join("docs/report.TXT"), "r").unwrap();
        fs::write(root.join("docs/inner/deep.txt"), "d").unwrap();
        temp_dir
    }

    fn walk(root: &Path, recursive: bool) -> Walk {
        Walk::new(root, root, recursive, |_| true).unwrap()
    }

    fn names(iter: impl Iterator<Item = Result<ListEntry>>) -> Vec<String> {
        iter.map(|e| e.unwrap().relative_path).collect()
    }

    #[test]
    fn test_walk_flat_skips_records() {
        let temp_dir = create_test_tree();
        assert_eq!(
            names(walk(temp_dir.path(), false)),
            vec!["A.log", "b.txt", "docs"]
        );
    }

    #[test]
    fn test_walk_recursive_dir_before_children() {
        let temp_dir = create_test_tree();
        assert_eq!(
            names(walk(temp_dir.path(), true)),
            vec![
                "A.log",
                "b.txt",
                "docs",
                "docs/inner",
                "docs/inner/deep.txt",
                "docs/report.TXT"
            ]
        );
    }

    #[test]
    fn test_walk_respects_descend_filter() {
        let temp_dir = create_test_tree();
        let root = temp_dir.path();
        let blocked = root.join("docs/inner");
        let walk = Walk::new(root, root, true, move |p| p != blocked).unwrap();

        let listed = names(walk);
        assert!(listed.contains(&"docs/inner".to_string()));
        assert!(!listed.contains(&"docs/inner/deep.txt".to_string()));
    }

    #[test]
    fn test_entry_summary_line() {
        let temp_dir = create_test_tree();
        let root = temp_dir.path();

        let file = ListEntry::from_path(root, &root.join("b.txt")).unwrap();
        assert_eq!(file.summary_line(), "b.txt --- 2 KB --- FILE");

        let dir = ListEntry::from_path(root, &root.join("docs")).unwrap();
        assert_eq!(dir.size_bytes, 0);
        assert_eq!(dir.summary_line(), "docs --- 0 KB --- DIR");
    }

    #[test]
    fn test_filter_extension_keeps_dirs() {
        let temp_dir = create_test_tree();
        let listing = Listing::new(
            walk(temp_dir.path(), true),
            ListMode::FilterExtension(".txt".to_string()),
            Tz::UTC,
        );
        assert_eq!(
            names(listing),
            vec![
                "b.txt",
                "docs",
                "docs/inner",
                "docs/inner/deep.txt",
                "docs/report.TXT"
            ]
        );
    }

    #[test]
    fn test_filter_name_substring() {
        let temp_dir = create_test_tree();
        let listing = Listing::new(
            walk(temp_dir.path(), false),
            ListMode::FilterName("log".to_string()),
            Tz::UTC,
        );
        assert_eq!(names(listing), vec!["A.log", "docs"]);
    }

    #[test]
    fn test_sort_by_name_ignores_case() {
        let temp_dir = create_test_tree();
        let root = temp_dir.path();
        fs::write(root.join("c.md"), "").unwrap();

        let ascending = Listing::new(walk(root, false), ListMode::SortByName(Order::Ascending), Tz::UTC);
        assert_eq!(names(ascending), vec!["A.log", "b.txt", "c.md", "docs"]);

        let descending =
            Listing::new(walk(root, false), ListMode::SortByName(Order::Descending), Tz::UTC);
        assert_eq!(names(descending), vec!["docs", "c.md", "b.txt", "A.log"]);
    }

    #[test]
    fn test_sort_by_modified_renders_time() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let old = root.join("old.txt");
        let new = root.join("new.txt");
        fs::write(&old, "").unwrap();
        fs::write(&new, "").unwrap();
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(base)
            .unwrap();
        fs::File::options()
            .write(true)
            .open(&new)
            .unwrap()
            .set_modified(base + Duration::from_secs(60))
            .unwrap();

        let lines = Listing::new(
            walk(root, false),
            ListMode::SortByModified(Order::Descending),
            Tz::UTC,
        )
        .lines()
        .unwrap();

        assert_eq!(
            lines,
            vec![
                "new.txt --- 0 KB --- FILE --- 14.11.2023 22:14:20",
                "old.txt --- 0 KB --- FILE --- 14.11.2023 22:13:20",
            ]
        );
    }

    #[test]
    fn test_options_builder() {
        let options = ListOptions::new()
            .recursive()
            .mode(ListMode::SortByName(Order::Ascending));
        assert!(options.recursive);
        assert_eq!(options.mode, ListMode::SortByName(Order::Ascending));
        assert_eq!(ListOptions::default().mode, ListMode::All);
    }
}
