//! Read-only view of a schema source tree.
//!
//! Paths handed to a [`SourceTree`] are `/`-separated and relative to the
//! tree root. Listing a missing directory yields an empty result rather
//! than an error, so pattern expansion can probe freely.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SourceError;
use crate::location::Location;

/// A file found while listing a directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileHandle {
    /// Path relative to the tree root.
    pub path: String,
    /// Final path segment.
    pub name: String,
}

/// A directory and, when read recursively, its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirHandle {
    pub path: String,
    pub name: String,
    pub files: Vec<FileHandle>,
    pub dirs: Vec<DirHandle>,
}

impl DirHandle {
    /// Total number of files in this directory and below.
    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.iter().map(DirHandle::file_count).sum::<usize>()
    }
}

/// A versioned tree of schema files, as seen at a single ref.
pub trait SourceTree {
    /// Location this tree was opened from.
    fn location(&self) -> &Location;

    /// Files directly inside `dir` whose name matches `pattern`, sorted by name.
    fn list_files(&self, dir: &str, pattern: &Regex) -> Result<Vec<FileHandle>, SourceError>;

    /// Immediate subdirectories of `dir` whose name matches `pattern`,
    /// sorted by name. The handles carry no contents.
    fn list_directories(&self, dir: &str, pattern: &Regex) -> Result<Vec<DirHandle>, SourceError>;

    /// Recursive listing rooted at `dir`, keeping only files whose name
    /// matches `pattern`.
    fn read_tree(&self, dir: &str, pattern: &Regex) -> Result<DirHandle, SourceError>;

    fn read_to_string(&self, path: &str) -> Result<String, SourceError>;

    /// A path on the local file system holding the file's contents, for
    /// consumers (shell, CSV import) that need a real file.
    fn local_path(&self, path: &str) -> Result<PathBuf, SourceError>;
}

/// Joins a relative directory and a name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Matches every name.
pub static ANY_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new("^.*$").expect("valid regex"));

/// Last segment of a relative path.
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("", "roles.create.sql"), "roles.create.sql");
        assert_eq!(join(".", "a"), "a");
        assert_eq!(join("schemas/app/", "seeds"), "schemas/app/seeds");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("schemas/app/tables"), "tables");
        assert_eq!(base_name("schemas/app/"), "app");
        assert_eq!(base_name("x"), "x");
    }

    #[test]
    fn test_file_count() {
        let leaf = DirHandle {
            path: "a/b".into(),
            name: "b".into(),
            files: vec![FileHandle {
                path: "a/b/x.sql".into(),
                name: "x.sql".into(),
            }],
            dirs: vec![],
        };
        let root = DirHandle {
            path: "a".into(),
            name: "a".into(),
            files: vec![FileHandle {
                path: "a/y.sql".into(),
                name: "y.sql".into(),
            }],
            dirs: vec![leaf],
        };
        assert_eq!(root.file_count(), 2);
    }
}
