//! Source tree backed by a local directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use ddsl_core::source::join;
use ddsl_core::{DirHandle, FileHandle, Location, SourceError, SourceTree};
use regex::Regex;
use tracing::debug;

/// A working-tree view of a directory on disk.
#[derive(Debug)]
pub struct LocalTree {
    location: Location,
    root: PathBuf,
}

impl LocalTree {
    /// Opens `location.path` as the tree root.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] if the root is not a directory.
    pub fn open(location: &Location) -> Result<Self, SourceError> {
        let root = PathBuf::from(&location.path);
        if !root.is_dir() {
            return Err(SourceError::NotFound(location.path.clone()));
        }
        debug!(root = %root.display(), "Opened local source tree");
        Ok(Self {
            location: location.clone(),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, SourceError> {
        let mut path = self.root.clone();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return Err(SourceError::OutsideRoot(relative.to_string())),
            }
        }
        Ok(path)
    }

    /// Reads a directory, treating a missing one as empty.
    fn entries(&self, dir: &str) -> Result<Vec<(String, bool)>, SourceError> {
        let path = self.resolve(dir)?;
        let read = match fs::read_dir(&path) {
            Ok(read) => read,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(Vec::new());
            }
            Err(source) => return Err(SourceError::Io { path, source }),
        };

        let mut out = Vec::new();
        for entry in read {
            let entry = entry.map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let is_dir = entry
                .file_type()
                .map_err(|source| SourceError::Io {
                    path: entry.path(),
                    source,
                })?
                .is_dir();
            out.push((name, is_dir));
        }
        out.sort();
        Ok(out)
    }
}

impl SourceTree for LocalTree {
    fn location(&self) -> &Location {
        &self.location
    }

    fn list_files(&self, dir: &str, pattern: &Regex) -> Result<Vec<FileHandle>, SourceError> {
        Ok(self
            .entries(dir)?
            .into_iter()
            .filter(|(name, is_dir)| !is_dir && pattern.is_match(name))
            .map(|(name, _)| FileHandle {
                path: join(dir, &name),
                name,
            })
            .collect())
    }

    fn list_directories(&self, dir: &str, pattern: &Regex) -> Result<Vec<DirHandle>, SourceError> {
        Ok(self
            .entries(dir)?
            .into_iter()
            .filter(|(name, is_dir)| *is_dir && pattern.is_match(name))
            .map(|(name, _)| DirHandle {
                path: join(dir, &name),
                name,
                files: Vec::new(),
                dirs: Vec::new(),
            })
            .collect())
    }

    fn read_tree(&self, dir: &str, pattern: &Regex) -> Result<DirHandle, SourceError> {
        let mut handle = DirHandle {
            path: dir.to_string(),
            name: ddsl_core::source::base_name(dir).to_string(),
            files: Vec::new(),
            dirs: Vec::new(),
        };
        for (name, is_dir) in self.entries(dir)? {
            let path = join(dir, &name);
            if is_dir {
                handle.dirs.push(self.read_tree(&path, pattern)?);
            } else if pattern.is_match(&name) {
                handle.files.push(FileHandle { path, name });
            }
        }
        Ok(handle)
    }

    fn read_to_string(&self, path: &str) -> Result<String, SourceError> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full).map_err(|source| match source.kind() {
            ErrorKind::NotFound => SourceError::NotFound(path.to_string()),
            _ => SourceError::Io { path: full, source },
        })
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, SourceError> {
        let full = self.resolve(path)?;
        if !full.is_file() {
            return Err(SourceError::NotFound(path.to_string()));
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddsl_core::ANY_NAME;

    fn fixture() -> (tempfile::TempDir, LocalTree) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("schemas/app/tables/users")).unwrap();
        fs::create_dir_all(root.join("schemas/app/tables/orders")).unwrap();
        fs::write(root.join("schemas/app/tables/users/table.create.sql"), "create table users(id int);").unwrap();
        fs::write(root.join("schemas/app/tables/users/table.drop.sql"), "drop table users;").unwrap();
        fs::write(root.join("roles.create.sql"), "-- roles").unwrap();

        let location: Location = root.to_string_lossy().parse().unwrap();
        let tree = LocalTree::open(&location).unwrap();
        (dir, tree)
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let (_dir, tree) = fixture();
        let re = Regex::new(r"^table\..*\.sql$").unwrap();
        let files = tree.list_files("schemas/app/tables/users", &re).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["table.create.sql", "table.drop.sql"]);
        assert_eq!(files[0].path, "schemas/app/tables/users/table.create.sql");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let (_dir, tree) = fixture();
        assert!(tree.list_files("schemas/nope", &ANY_NAME).unwrap().is_empty());
        assert!(tree.list_directories("schemas/nope/tables", &ANY_NAME).unwrap().is_empty());
        // A file where a directory is expected also reads as empty.
        assert!(tree.list_files("roles.create.sql", &ANY_NAME).unwrap().is_empty());
    }

    #[test]
    fn test_list_directories() {
        let (_dir, tree) = fixture();
        let dirs = tree.list_directories("schemas/app/tables", &ANY_NAME).unwrap();
        let names: Vec<_> = dirs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["orders", "users"]);
        assert_eq!(dirs[1].path, "schemas/app/tables/users");
    }

    #[test]
    fn test_read_tree_recurses() {
        let (_dir, tree) = fixture();
        let re = Regex::new(r"create").unwrap();
        let handle = tree.read_tree("", &re).unwrap();
        assert_eq!(handle.file_count(), 2);
        assert_eq!(handle.files[0].name, "roles.create.sql");
    }

    #[test]
    fn test_read_and_local_path() {
        let (_dir, tree) = fixture();
        assert_eq!(tree.read_to_string("roles.create.sql").unwrap(), "-- roles");
        assert!(tree.local_path("roles.create.sql").unwrap().is_file());
        assert!(matches!(
            tree.read_to_string("missing.sql"),
            Err(SourceError::NotFound(p)) if p == "missing.sql"
        ));
        assert!(matches!(tree.local_path("schemas"), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let (_dir, tree) = fixture();
        assert!(matches!(
            tree.read_to_string("../etc/passwd"),
            Err(SourceError::OutsideRoot(_))
        ));
    }

    #[test]
    fn test_open_requires_directory() {
        let location: Location = "/definitely/not/here".parse().unwrap();
        assert!(matches!(LocalTree::open(&location), Err(SourceError::NotFound(_))));
    }
}
