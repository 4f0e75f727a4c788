//! Source tree pinned to a git ref.
//!
//! Listings come from `git ls-tree` and contents from `git show`, so the
//! working tree is never touched. Files needed on disk (shell scripts, CSV
//! seeds) are materialized into a private temporary directory that lives as
//! long as the tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use ddsl_core::source::{base_name, join};
use ddsl_core::{DirHandle, FileHandle, Location, SourceError, SourceTree};
use regex::Regex;
use tempfile::TempDir;
use tracing::debug;

/// Ref used when a `git://` location carries no fragment.
pub const DEFAULT_REF: &str = "HEAD";

#[derive(Debug, PartialEq, Eq)]
enum EntryKind {
    Blob,
    Tree,
}

/// A read-only view of a repository directory at one ref.
#[derive(Debug)]
pub struct GitTree {
    location: Location,
    dir: PathBuf,
    git_ref: String,
    scratch: TempDir,
}

impl GitTree {
    /// Opens `location.path` at `location.fragment` (or [`DEFAULT_REF`]).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Git`] if the directory is not inside a
    /// repository or the ref does not name a commit.
    pub fn open(location: &Location) -> Result<Self, SourceError> {
        let dir = PathBuf::from(&location.path);
        if !dir.is_dir() {
            return Err(SourceError::NotFound(location.path.clone()));
        }
        let git_ref = location.fragment.clone().unwrap_or_else(|| DEFAULT_REF.to_string());

        let output = git(&dir, &["rev-parse", "--verify", "--quiet", &format!("{git_ref}^{{commit}}")])?;
        if !output.status.success() {
            return Err(SourceError::Git(format!("unknown ref '{git_ref}' in {}", dir.display())));
        }
        let scratch = tempfile::Builder::new()
            .prefix("ddsl-git-")
            .tempdir()
            .map_err(|source| SourceError::Io {
                path: std::env::temp_dir(),
                source,
            })?;
        debug!(dir = %dir.display(), git_ref = %git_ref, "Opened git source tree");

        Ok(Self {
            location: location.clone(),
            dir,
            git_ref,
            scratch,
        })
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    /// Lists the immediate entries of `dir` at the pinned ref.
    fn entries(&self, dir: &str) -> Result<Vec<(String, EntryKind)>, SourceError> {
        check_relative(dir)?;
        let dir = dir.trim_end_matches('/');
        let mut args = vec!["ls-tree".to_string(), self.git_ref.clone()];
        if !dir.is_empty() && dir != "." {
            args.push("--".to_string());
            args.push(format!("{dir}/"));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = git(&self.dir, &args)?;
        if !output.status.success() {
            return Err(SourceError::Git(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }

        let mut out = Vec::new();
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            // <mode> SP <type> SP <object> TAB <path>
            let Some((meta, path)) = line.split_once('\t') else {
                continue;
            };
            let kind = match meta.split(' ').nth(1) {
                Some("blob") => EntryKind::Blob,
                Some("tree") => EntryKind::Tree,
                _ => continue,
            };
            out.push((base_name(path).to_string(), kind));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn show(&self, path: &str) -> Result<Vec<u8>, SourceError> {
        check_relative(path)?;
        let spec = format!("{}:./{path}", self.git_ref);
        let output = git(&self.dir, &["show", &spec])?;
        if !output.status.success() {
            return Err(SourceError::NotFound(format!("{path}#{}", self.git_ref)));
        }
        Ok(output.stdout)
    }
}

impl SourceTree for GitTree {
    fn location(&self) -> &Location {
        &self.location
    }

    fn list_files(&self, dir: &str, pattern: &Regex) -> Result<Vec<FileHandle>, SourceError> {
        Ok(self
            .entries(dir)?
            .into_iter()
            .filter(|(name, kind)| *kind == EntryKind::Blob && pattern.is_match(name))
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
            .filter(|(name, kind)| *kind == EntryKind::Tree && pattern.is_match(name))
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
            name: base_name(dir).to_string(),
            files: Vec::new(),
            dirs: Vec::new(),
        };
        for (name, kind) in self.entries(dir)? {
            let path = join(dir, &name);
            match kind {
                EntryKind::Tree => handle.dirs.push(self.read_tree(&path, pattern)?),
                EntryKind::Blob if pattern.is_match(&name) => handle.files.push(FileHandle { path, name }),
                EntryKind::Blob => {}
            }
        }
        Ok(handle)
    }

    fn read_to_string(&self, path: &str) -> Result<String, SourceError> {
        let bytes = self.show(path)?;
        String::from_utf8(bytes).map_err(|_| SourceError::Git(format!("{path} is not valid UTF-8")))
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, SourceError> {
        let bytes = self.show(path)?;
        let target = self.scratch.path().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| SourceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, bytes).map_err(|source| SourceError::Io {
            path: target.clone(),
            source,
        })?;
        debug!(path, target = %target.display(), "Materialized file from git");
        Ok(target)
    }
}

fn check_relative(path: &str) -> Result<(), SourceError> {
    if path.starts_with('/') || path.split('/').any(|part| part == "..") {
        return Err(SourceError::OutsideRoot(path.to_string()));
    }
    Ok(())
}

fn git(dir: &Path, args: &[&str]) -> Result<Output, SourceError> {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map_err(|e| SourceError::Git(format!("failed to run git: {e}")))
}
