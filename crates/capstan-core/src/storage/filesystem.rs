//! Filesystem backing store.
//!
//! Records are laid out as one directory per kind, a subdirectory per
//! group, and one file per key:
//!
//! ```text
//! installations/
//!   mysql.json
//! claims/
//!   mysql/
//!     01EAZDEPCBPEEHQG9C4AF5X1PY.json   (install)
//!     01EAZDEW0R8MQ0GS5D5EAQA2J9.json   (upgrade)
//! results/
//!   01EAZDEPCBPEEHQG9C4AF5X1PY/
//!     01EAZDGPM8EQKXA544AHCBMYXH.json   (succeeded)
//! outputs/
//!   01EAZDGPM8EQKXA544AHCBMYXH/
//!     01EAZDGPM8EQKXA544AHCBMYXH-CONNSTR
//! ```
//!
//! Structured records carry a per-kind file extension; outputs are raw
//! bytes with none. Keys containing `/` (namespaced installations) are
//! resolved as paths relative to the kind directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{StorageError, Store};

/// A backing store that persists records as files under a root directory.
pub struct FileSystemStore {
    root: PathBuf,
    extensions: HashMap<String, String>,
}

/// The file extensions used by claim data: structured records are JSON,
/// outputs are raw bytes.
#[must_use]
pub fn claim_store_extensions() -> HashMap<String, String> {
    let json = ".json".to_string();
    HashMap::from([
        ("installations".to_string(), json.clone()),
        ("claims".to_string(), json.clone()),
        ("results".to_string(), json),
        ("outputs".to_string(), String::new()),
    ])
}

impl FileSystemStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory does not have to exist yet; it is created on the
    /// first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, extensions: HashMap<String, String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    /// The root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn extension(&self, kind: &str) -> &str {
        self.extensions.get(kind).map_or("", String::as_str)
    }

    fn file_name(&self, kind: &str, key: &str) -> String {
        format!("{key}{}", self.extension(kind))
    }

    fn save_path(&self, kind: &str, group: &str, key: &str) -> PathBuf {
        let kind_dir = self.root.join(kind);
        if key.contains('/') || group.is_empty() {
            kind_dir.join(self.file_name(kind, key))
        } else {
            kind_dir.join(group).join(self.file_name(kind, key))
        }
    }

    /// Locates the file backing a key: the kind root first, then each
    /// group subdirectory.
    fn find(&self, kind: &str, key: &str) -> Result<PathBuf, StorageError> {
        let kind_dir = self.root.join(kind);
        let file_name = self.file_name(kind, key);

        let direct = kind_dir.join(&file_name);
        if direct.is_file() {
            return Ok(direct);
        }

        if !key.contains('/') {
            let entries = match fs::read_dir(&kind_dir) {
                Ok(entries) => entries,
                Err(error) if error.kind() == io::ErrorKind::NotFound => {
                    return Err(StorageError::RecordDoesNotExist);
                }
                Err(error) => return Err(error.into()),
            };
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    let candidate = entry.path().join(&file_name);
                    if candidate.is_file() {
                        return Ok(candidate);
                    }
                }
            }
        }

        Err(StorageError::RecordDoesNotExist)
    }

    fn group_dir(&self, kind: &str, group: &str) -> PathBuf {
        let kind_dir = self.root.join(kind);
        if group.is_empty() {
            kind_dir
        } else {
            kind_dir.join(group)
        }
    }

    /// Strips the kind's extension from a directory entry name.
    fn strip_extension<'a>(&self, kind: &str, name: &'a str) -> &'a str {
        let ext = self.extension(kind);
        if ext.is_empty() {
            name
        } else {
            name.strip_suffix(ext).unwrap_or(name)
        }
    }

    fn read_group_files(&self, dir: &Path, records: &mut Vec<Vec<u8>>) -> Result<(), StorageError> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                paths.push(entry.path());
            }
        }
        paths.sort();
        for path in paths {
            records.push(fs::read(path)?);
        }
        Ok(())
    }
}

impl Store for FileSystemStore {
    fn list(&self, kind: &str, group: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.group_dir(kind, group);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::RecordDoesNotExist);
            }
            Err(error) => return Err(error.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(self.strip_extension(kind, name).to_string());
            }
        }
        Ok(names)
    }

    fn read(&self, kind: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.find(kind, key)?;
        Ok(fs::read(path)?)
    }

    fn read_all(&self, kind: &str, group: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let dir = self.group_dir(kind, group);
        let mut records = Vec::new();

        if group.is_empty() {
            // Whole-kind scan: files at the kind root plus one level of
            // group subdirectories.
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(records),
                Err(error) => return Err(error.into()),
            };
            let mut subdirs: Vec<PathBuf> = Vec::new();
            let mut files: Vec<PathBuf> = Vec::new();
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    subdirs.push(entry.path());
                } else {
                    files.push(entry.path());
                }
            }
            files.sort();
            subdirs.sort();
            for path in files {
                records.push(fs::read(path)?);
            }
            for subdir in subdirs {
                self.read_group_files(&subdir, &mut records)?;
            }
            return Ok(records);
        }

        match fs::metadata(&dir) {
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::RecordDoesNotExist);
            }
            Err(error) => return Err(error.into()),
        }
        self.read_group_files(&dir, &mut records)?;
        Ok(records)
    }

    fn save(&self, kind: &str, group: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.save_path(kind, group, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }

    fn delete(&self, kind: &str, key: &str) -> Result<(), StorageError> {
        let path = self.find(kind, key)?;
        fs::remove_file(path)?;
        Ok(())
    }
}
