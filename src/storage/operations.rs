//! File operations of an open storage.
//!
//! Every operation authorizes first, then runs its quota gates, and only
//! then touches the filesystem. The usage counter moves after each
//! successful mutation. Multi-path calls stop at the first failing path;
//! whatever already happened is persisted.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::engine::Storage;
use super::layout::{self, DOWNLOAD_DIR};
use super::listing::{ListOptions, Listing, Walk};
use super::pattern::expand_names;
use super::quota::path_size;
use crate::auth::{check_privilege, FolderScope, Privilege};
use crate::{Result, StorageError};

/// A file scheduled for import by `put`.
struct Import {
    source: PathBuf,
    target: PathBuf,
    size: u64,
    released: u64,
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))
}

fn metadata_or_not_found(path: &Path, label: &str) -> Result<fs::Metadata> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(StorageError::FileNotFound(label.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

impl Storage {
    /// Resolve `path` and require it to be an existing directory.
    fn existing_dir(&self, path: &str) -> Result<PathBuf> {
        let dir = self.resolve(path)?;
        let meta = metadata_or_not_found(&dir, path)?;
        if !meta.is_dir() {
            return Err(StorageError::InvalidPath(format!("{path} is not a directory")));
        }
        Ok(dir)
    }

    fn ensure_not_reserved(&self, path: &Path) -> Result<()> {
        if layout::is_reserved(self.root(), path) {
            return Err(StorageError::ReservedPath(self.relative(path)));
        }
        Ok(())
    }

    fn ensure_allowed_extension(&self, name: &str) -> Result<()> {
        if self.model.is_denied_extension(name) {
            return Err(StorageError::InvalidExtension(name.to_string()));
        }
        Ok(())
    }

    fn delete_failed(&self, path: &Path, source: io::Error) -> StorageError {
        StorageError::FileDeleteFailed {
            path: self.relative(path),
            source,
        }
    }

    fn remove_existing(&mut self, path: &Path, is_dir: bool) -> Result<()> {
        let released = path_size(path)?;
        let removed = if is_dir {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        removed.map_err(|source| self.delete_failed(path, source))?;
        self.model.quota.release(released);
        self.model.forget_policies(path);
        Ok(())
    }

    /// Create folders inside `path`.
    ///
    /// Each name may carry a brace range, so `build{1-3}` creates `build1`,
    /// `build2` and `build3`.
    pub fn create_folder(&mut self, path: &str, names: &[&str]) -> Result<()> {
        let dir = self.resolve(path)?;
        self.authorize(Privilege::Create, &dir)?;
        let dir = self.existing_dir(path)?;

        let mut targets: Vec<PathBuf> = Vec::new();
        for name in names {
            for expanded in expand_names(name)? {
                layout::validate_name(&expanded)?;
                let target = dir.join(&expanded);
                self.ensure_not_reserved(&target)?;
                if target.exists() || targets.contains(&target) {
                    return Err(StorageError::OperationFailed(format!(
                        "{} already exists",
                        self.relative(&target)
                    )));
                }
                targets.push(target);
            }
        }

        self.model
            .quota
            .check_file_count(self.root(), &dir, targets.len())?;

        for target in &targets {
            fs::create_dir(target)?;
            debug!(folder = %self.relative(target), "folder created");
        }
        info!(dir = %path, count = targets.len(), "folders created");
        self.persist()
    }

    /// Create empty files inside `path`, creating `path` itself if needed.
    pub fn create_file(&mut self, path: &str, names: &[&str]) -> Result<()> {
        let dir = self.resolve(path)?;
        self.authorize(Privilege::Create, &dir)?;
        if dir.exists() && !dir.is_dir() {
            return Err(StorageError::InvalidPath(format!("{path} is not a directory")));
        }

        let mut targets: Vec<PathBuf> = Vec::new();
        for name in names {
            layout::validate_name(name)?;
            self.ensure_allowed_extension(name)?;
            let target = dir.join(name);
            self.ensure_not_reserved(&target)?;
            if target.exists() || targets.contains(&target) {
                return Err(StorageError::OperationFailed(format!(
                    "{} already exists",
                    self.relative(&target)
                )));
            }
            targets.push(target);
        }

        let root = self.root();
        self.model
            .quota
            .check_file_count(root, &dir, targets.len())?;
        if !dir.exists() {
            // The first missing component becomes a new entry of its deepest existing ancestor.
            if let Some(anchor) = dir.ancestors().skip(1).find(|p| p.is_dir()) {
                self.model.quota.check_file_count(root, anchor, 1)?;
            }
            fs::create_dir_all(&dir)?;
        }

        for target in &targets {
            OpenOptions::new().write(true).create_new(true).open(target)?;
            debug!(file = %self.relative(target), "file created");
        }
        info!(dir = %path, count = targets.len(), "files created");
        self.persist()
    }

    /// Delete files or folders, folders with their whole content.
    pub fn delete(&mut self, paths: &[&str]) -> Result<()> {
        let outcome = paths.iter().try_for_each(|path| self.delete_one(path));
        let persisted = self.persist();
        outcome.and(persisted)
    }

    fn delete_one(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        self.ensure_not_reserved(&target)?;
        self.authorize(Privilege::Delete, &target)?;
        let meta = metadata_or_not_found(&target, path)?;

        let before = self.model.quota.current_storage_size;
        self.remove_tree(&target, meta.is_dir())?;
        info!(
            path = %path,
            released = before.saturating_sub(self.model.quota.current_storage_size),
            "deleted"
        );
        Ok(())
    }

    /// Remove `path` depth-first, releasing each file as it goes.
    fn remove_tree(&mut self, path: &Path, is_dir: bool) -> Result<()> {
        if is_dir {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let is_dir = entry.file_type()?.is_dir();
                self.remove_tree(&entry.path(), is_dir)?;
            }
            fs::remove_dir(path).map_err(|e| self.delete_failed(path, e))?;
        } else {
            let size = fs::symlink_metadata(path)?.len();
            fs::remove_file(path).map_err(|e| self.delete_failed(path, e))?;
            self.model.quota.release(size);
        }
        self.model.forget_policies(path);
        Ok(())
    }

    /// Move files or folders into the `destination` folder.
    ///
    /// An entry already present under the same name is replaced.
    pub fn move_to(&mut self, destination: &str, sources: &[&str]) -> Result<()> {
        let dest = self.resolve(destination)?;
        self.authorize(Privilege::Create, &dest)?;
        let dest = self.existing_dir(destination)?;

        let sources = sources
            .iter()
            .map(|label| Ok((label.to_string(), self.resolve(label)?)))
            .collect::<Result<Vec<_>>>()?;

        let outcome = self.relocate(&dest, &sources);
        let persisted = self.persist();
        outcome.and(persisted)
    }

    /// Move storage entries into `dest`. Size-neutral apart from replaced targets.
    fn relocate(&mut self, dest: &Path, sources: &[(String, PathBuf)]) -> Result<()> {
        let mut moves = Vec::with_capacity(sources.len());
        let mut new_entries = BTreeSet::new();

        for (label, source) in sources {
            self.ensure_not_reserved(source)?;
            let meta = metadata_or_not_found(source, label)?;
            let name = file_name(source)?;
            if !meta.is_dir() {
                self.ensure_allowed_extension(&name)?;
            }
            if dest.starts_with(source) {
                return Err(StorageError::InvalidPath(format!(
                    "{label} cannot be moved into itself"
                )));
            }

            let target = dest.join(&name);
            if target == *source {
                continue;
            }
            self.ensure_not_reserved(&target)?;
            // Replacing the target must not remove any entry of this batch.
            if let Some((other, _)) = sources.iter().find(|(_, s)| s.starts_with(&target)) {
                return Err(StorageError::InvalidPath(format!(
                    "moving {label} would replace {}, which contains {other}",
                    self.relative(&target)
                )));
            }
            if !target.exists() {
                new_entries.insert(target.clone());
            }
            moves.push((label, source, target));
        }

        self.model
            .quota
            .check_file_count(self.root(), dest, new_entries.len())?;

        for (label, source, target) in moves {
            if let Ok(existing) = fs::symlink_metadata(&target) {
                self.remove_existing(&target, existing.is_dir())?;
                debug!(target = %self.relative(&target), "replaced existing entry");
            }
            fs::rename(source, &target)?;
            self.model.rebase_policies(source, &target);
            info!(from = %label, to = %self.relative(&target), "moved");
        }
        Ok(())
    }

    /// Copy files from outside the storage into the `destination` folder.
    ///
    /// Sources must be regular files. A file already present under the
    /// same name is overwritten.
    pub fn put<P: AsRef<Path>>(&mut self, destination: &str, sources: &[P]) -> Result<()> {
        let dest = self.resolve(destination)?;
        self.authorize(Privilege::Create, &dest)?;
        let dest = self.existing_dir(destination)?;

        let mut imports: Vec<Import> = Vec::with_capacity(sources.len());
        let mut new_entries = 0;
        for source in sources {
            let source = source.as_ref();
            let label = source.display().to_string();
            let meta = match fs::metadata(source) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(StorageError::FileNotFound(label))
                }
                Err(e) => return Err(e.into()),
            };
            let source = source.canonicalize()?;
            if self.model.contains_path(&source) {
                return Err(StorageError::FileAlreadyInStorage(label));
            }
            if !meta.is_file() {
                return Err(StorageError::OperationFailed(format!(
                    "{label} is not a regular file"
                )));
            }

            let name = file_name(&source)?;
            self.ensure_allowed_extension(&name)?;
            let target = dest.join(&name);
            self.ensure_not_reserved(&target)?;
            if imports.iter().any(|import| import.target == target) {
                return Err(StorageError::OperationFailed(format!(
                    "{name} is imported twice"
                )));
            }

            let released = match fs::symlink_metadata(&target) {
                Ok(existing) if existing.is_dir() => {
                    return Err(StorageError::OperationFailed(format!(
                        "{} is a directory",
                        self.relative(&target)
                    )))
                }
                Ok(existing) => existing.len(),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    new_entries += 1;
                    0
                }
                Err(e) => return Err(e.into()),
            };

            imports.push(Import {
                source,
                target,
                size: meta.len(),
                released,
            });
        }

        self.model
            .quota
            .check_file_count(self.root(), &dest, new_entries)?;
        let added: u64 = imports.iter().map(|i| i.size).sum();
        let released: u64 = imports.iter().map(|i| i.released).sum();
        self.model.quota.check_size(added, released)?;

        let outcome = imports
            .into_iter()
            .try_for_each(|import| self.import_one(import));
        let persisted = self.persist();
        outcome.and(persisted)
    }

    fn import_one(&mut self, import: Import) -> Result<()> {
        self.model.quota.check_size(import.size, import.released)?;
        let copied = fs::copy(&import.source, &import.target)?;
        self.model.quota.apply(copied, import.released);
        info!(
            source = %import.source.display(),
            target = %self.relative(&import.target),
            bytes = copied,
            "imported"
        );
        Ok(())
    }

    /// Move entries into the `Download` folder.
    pub fn get(&mut self, paths: &[&str]) -> Result<()> {
        let download = self.root().join(DOWNLOAD_DIR);
        fs::create_dir_all(&download)?;

        let outcome = paths.iter().try_for_each(|path| {
            let source = self.resolve(path)?;
            self.authorize(Privilege::Download, &source)?;
            self.relocate(&download, &[(path.to_string(), source)])
        });
        let persisted = self.persist();
        outcome.and(persisted)
    }

    /// List the folder at `path`.
    ///
    /// Recursive listings do not descend into folders the current user
    /// may not view.
    pub fn list(&self, path: &str, options: ListOptions) -> Result<Listing> {
        let dir = self.resolve(path)?;
        self.authorize(Privilege::View, &dir)?;
        let dir = self.existing_dir(path)?;

        let root = self.root().to_path_buf();
        let user = self.model.current_user().cloned();
        let entries = self.model.folder_privileges.clone();
        let privilege_scope = self.settings.privilege_scope;
        let can_descend = {
            let root = root.clone();
            move |candidate: &Path| {
                let scope = FolderScope::new(&root, &entries, privilege_scope);
                check_privilege(user.as_ref(), Privilege::View, candidate, &scope).is_ok()
            }
        };

        let walk = Walk::new(root, &dir, options.recursive, can_descend)?;
        debug!(dir = %path, recursive = options.recursive, mode = ?options.mode, "listing");
        Ok(Listing::new(walk, options.mode, self.settings.timezone))
    }
}
