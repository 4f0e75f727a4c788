//! Run configuration.
//!
//! Settings are layered by the binary: command-line flags, then the
//! `DDSL_SOURCE`/`DDSL_DATABASE` environment, then a YAML file, then the
//! defaults below.
//!
//! # Example YAML
//!
//! ```yaml
//! source: ./db
//! database: sqlite://app.db
//! auto_transaction: true
//! dry_run: false
//! format: text
//! ```

use std::io::{BufReader, BufWriter};
use std::path::Path;

use ddsl_core::Location;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::output::OutputFormat;

/// Settings for one invocation.
///
/// # Examples
///
/// ```
/// # use ddsl_engine::RunConfig;
/// let config: RunConfig = serde_yaml::from_str("source: ./db\ndry_run: true").unwrap();
/// assert!(config.dry_run);
/// assert!(config.auto_transaction);
/// assert_eq!(config.source_location().unwrap().path, "./db");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Source tree location (`file://dir`, `dir#ref`, `git://dir#ref`).
    pub source: Option<String>,
    /// Database location (`sqlite://path`).
    pub database: Option<String>,
    /// Wrap each non-list batch in a transaction.
    pub auto_transaction: bool,
    /// Log instead of executing.
    pub dry_run: bool,
    /// Format for `list` output.
    pub format: OutputFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: None,
            database: None,
            auto_transaction: true,
            dry_run: false,
            format: OutputFormat::Text,
        }
    }
}

impl RunConfig {
    /// Loads configuration from a YAML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    pub fn source_location(&self) -> Result<Location, ConfigError> {
        Ok(self.source.as_deref().ok_or(ConfigError::Missing("source"))?.parse()?)
    }

    pub fn database_location(&self) -> Result<Location, ConfigError> {
        Ok(self.database.as_deref().ok_or(ConfigError::Missing("database"))?.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert!(config.auto_transaction);
        assert!(!config.dry_run);
        assert_eq!(config.format, OutputFormat::Text);
        assert!(matches!(config.source_location(), Err(ConfigError::Missing("source"))));
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ddsl.yml");
        std::fs::write(
            &path,
            "source: ./db#v2\ndatabase: sqlite://app.db\nauto_transaction: false\nformat: csv\n",
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert!(!config.auto_transaction);
        assert_eq!(config.format, OutputFormat::Csv);
        assert_eq!(config.source_location().unwrap().fragment.as_deref(), Some("v2"));
        assert_eq!(config.database_location().unwrap().scheme, "sqlite");

        let copy = dir.path().join("copy.yml");
        config.save(&copy).unwrap();
        assert_eq!(RunConfig::load(&copy).unwrap(), config);
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(serde_yaml::from_str::<RunConfig>("format: xml").is_err());
    }
}
