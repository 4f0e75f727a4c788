//! Scheme-keyed driver factories.
//!
//! Drivers register a factory per URL scheme; the engine resolves the
//! `--source` and `--database` locations through the registry it was given.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::database::Database;
use crate::error::RegistryError;
use crate::location::Location;
use crate::source::SourceTree;

pub type SourceFactory = Arc<dyn Fn(&Location) -> Result<Box<dyn SourceTree>, RegistryError> + Send + Sync>;
pub type DatabaseFactory = Arc<dyn Fn(&Location) -> Result<Box<dyn Database>, RegistryError> + Send + Sync>;

/// Maps URL schemes to source and database drivers.
#[derive(Clone, Default)]
pub struct Registry {
    sources: BTreeMap<String, SourceFactory>,
    databases: BTreeMap<String, DatabaseFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the source driver for `scheme`.
    pub fn register_source<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&Location) -> Result<Box<dyn SourceTree>, RegistryError> + Send + Sync + 'static,
    {
        self.sources.insert(scheme.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Registers (or replaces) the database driver for `scheme`.
    pub fn register_database<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&Location) -> Result<Box<dyn Database>, RegistryError> + Send + Sync + 'static,
    {
        self.databases.insert(scheme.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn open_source(&self, location: &Location) -> Result<Box<dyn SourceTree>, RegistryError> {
        let factory = self
            .sources
            .get(&location.scheme)
            .ok_or_else(|| RegistryError::UnknownScheme {
                kind: "source",
                scheme: location.scheme.clone(),
            })?;
        factory(location)
    }

    pub fn open_database(&self, location: &Location) -> Result<Box<dyn Database>, RegistryError> {
        let factory = self
            .databases
            .get(&location.scheme)
            .ok_or_else(|| RegistryError::UnknownScheme {
                kind: "database",
                scheme: location.scheme.clone(),
            })?;
        factory(location)
    }

    pub fn source_schemes(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn database_schemes(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("databases", &self.databases.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_scheme() {
        let registry = Registry::new();
        let loc: Location = "nope://x".parse().unwrap();
        let err = registry.open_database(&loc).err().unwrap();
        assert_eq!(err.to_string(), "no database driver registered for scheme 'nope'");
        let err = registry.open_source(&loc).err().unwrap();
        assert!(matches!(err, RegistryError::UnknownScheme { kind: "source", .. }));
    }

    #[test]
    fn test_factory_receives_location() {
        let mut registry = Registry::new();
        registry.register_source("FILE", |loc| Err(RegistryError::InvalidLocation(loc.path.clone())));
        assert_eq!(registry.source_schemes().collect::<Vec<_>>(), ["file"]);

        let loc: Location = "/tmp/schema".parse().unwrap();
        let err = registry.open_source(&loc).err().unwrap();
        assert_eq!(err.to_string(), "invalid location '/tmp/schema'");
    }
}
