//! `scheme://path#ref` locations for sources and databases.

use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Scheme assumed for a bare path.
pub const DEFAULT_SCHEME: &str = "file";

/// A parsed driver location.
///
/// ```
/// use ddsl_core::Location;
///
/// let loc: Location = "git:///srv/schema#release".parse().unwrap();
/// assert_eq!(loc.scheme, "git");
/// assert_eq!(loc.path, "/srv/schema");
/// assert_eq!(loc.fragment.as_deref(), Some("release"));
///
/// let bare: Location = "./db".parse().unwrap();
/// assert_eq!(bare.scheme, "file");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub scheme: String,
    pub path: String,
    pub fragment: Option<String>,
}

impl Location {
    /// Returns the same location pinned to another ref.
    pub fn with_ref(&self, fragment: Option<&str>) -> Self {
        Self {
            fragment: fragment.map(str::to_string),
            ..self.clone()
        }
    }
}

impl FromStr for Location {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RegistryError::InvalidLocation(s.to_string()));
        }
        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => {
                if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-') {
                    return Err(RegistryError::InvalidLocation(s.to_string()));
                }
                (scheme.to_ascii_lowercase(), rest)
            }
            None => (DEFAULT_SCHEME.to_string(), s),
        };
        let (path, fragment) = match rest.rsplit_once('#') {
            Some((_, "")) => return Err(RegistryError::InvalidLocation(s.to_string())),
            Some((path, fragment)) => (path, Some(fragment.to_string())),
            None => (rest, None),
        };
        if path.is_empty() {
            return Err(RegistryError::InvalidLocation(s.to_string()));
        }
        Ok(Self {
            scheme,
            path: path.to_string(),
            fragment,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.path)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}
