//! Source tree drivers.
//!
//! - [`LocalTree`] reads a directory on disk (`file://dir` or a bare path).
//! - [`GitTree`] reads a repository at a ref (`file://dir#ref` or
//!   `git://dir#ref`) without touching the working tree.
//!
//! Call [`register`] to make both available through a
//! [`Registry`](ddsl_core::Registry).
//!
//! # Example
//!
//! ```no_run
//! use ddsl_core::{Location, Registry};
//!
//! let mut registry = Registry::new();
//! ddsl_source::register(&mut registry);
//!
//! let location: Location = "./db#release-2".parse().unwrap();
//! let tree = registry.open_source(&location).unwrap();
//! let sql = tree.read_to_string("roles.create.sql").unwrap();
//! ```

mod git;
mod local;

pub use git::{DEFAULT_REF, GitTree};
pub use local::LocalTree;

use ddsl_core::{Location, Registry, RegistryError, SourceTree};

/// Opens the driver a location asks for: git when it names a ref or uses
/// the `git` scheme, the local file system otherwise.
pub fn open(location: &Location) -> Result<Box<dyn SourceTree>, RegistryError> {
    let tree: Box<dyn SourceTree> = match (location.scheme.as_str(), &location.fragment) {
        ("git", _) | ("file", Some(_)) => Box::new(GitTree::open(location)?),
        ("file", None) => Box::new(LocalTree::open(location)?),
        (scheme, _) => {
            return Err(RegistryError::UnknownScheme {
                kind: "source",
                scheme: scheme.to_string(),
            });
        }
    };
    Ok(tree)
}

/// Registers the `file` and `git` schemes.
pub fn register(registry: &mut Registry) {
    registry.register_source("file", open);
    registry.register_source("git", open);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_schemes() {
        let mut registry = Registry::new();
        register(&mut registry);
        assert_eq!(registry.source_schemes().collect::<Vec<_>>(), ["file", "git"]);
    }

    #[test]
    fn test_open_local_by_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("roles.create.sql"), "x").unwrap();
        let location: Location = format!("file://{}", dir.path().display()).parse().unwrap();
        let tree = open(&location).unwrap();
        assert_eq!(tree.read_to_string("roles.create.sql").unwrap(), "x");
        assert_eq!(tree.location(), &location);
    }

    #[test]
    fn test_open_rejects_foreign_scheme() {
        let location: Location = "s3://bucket".parse().unwrap();
        assert!(matches!(open(&location), Err(RegistryError::UnknownScheme { .. })));
    }
}
