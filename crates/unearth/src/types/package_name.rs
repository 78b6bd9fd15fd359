use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use miette::Diagnostic;
use regex::Regex;
use serde::{Serialize, Serializer};
use serde_with::DeserializeFromStr;
use thiserror::Error;

/// The name of a distribution as it appears in requirement strings, filenames and
/// index pages. Keeps the string it was parsed from next to its normalized form so
/// that names can be compared reliably while the original spelling stays available
/// for display.
///
/// Normalization follows [PEP 503](https://peps.python.org/pep-0503/#normalized-names):
/// the name is lowercased and every run of `-`, `_` and `.` collapses into a single
/// `-`. Two names are equal when their normalized forms are equal.
#[derive(Debug, Clone, Eq, DeserializeFromStr)]
pub struct PackageName {
    source: String,
    normalized: String,
}

impl PackageName {
    /// The string this name was parsed from, original spelling intact.
    pub fn as_source_str(&self) -> &str {
        &self.source
    }

    /// The normalized form of the name.
    pub fn as_str(&self) -> &str {
        &self.normalized
    }
}

/// Error returned when a string is not a valid distribution name.
#[derive(Debug, Clone, Error, Diagnostic)]
#[allow(missing_docs)]
pub enum ParsePackageNameError {
    #[error("invalid package name '{0}'")]
    InvalidPackageName(String),
}

impl FromStr for PackageName {
    type Err = ParsePackageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static VALIDATE: OnceLock<Regex> = OnceLock::new();
        static SEPARATORS: OnceLock<Regex> = OnceLock::new();

        // https://packaging.python.org/specifications/core-metadata/#name
        let validate = VALIDATE.get_or_init(|| {
            Regex::new(r"(?i-u)^([A-Z0-9]|[A-Z0-9][A-Z0-9._-]*[A-Z0-9])$").unwrap()
        });
        if !validate.is_match(s) {
            return Err(ParsePackageNameError::InvalidPackageName(s.into()));
        }

        let separators = SEPARATORS.get_or_init(|| Regex::new(r"[-_.]+").unwrap());
        let normalized = separators.replace_all(s, "-").to_lowercase();

        Ok(PackageName {
            source: s.to_owned(),
            normalized,
        })
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state)
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl PartialOrd for PackageName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.normalized.cmp(&other.normalized)
    }
}

impl Serialize for PackageName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.source.serialize(serializer)
    }
}

/// A distribution name that carries only its PEP-503 normalized form. Guaranteed to
/// be normalized on construction, so normalization is idempotent by type.
#[repr(transparent)]
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, DeserializeFromStr)]
pub struct NormalizedPackageName(String);

impl From<PackageName> for NormalizedPackageName {
    fn from(value: PackageName) -> Self {
        Self(value.normalized)
    }
}

impl From<NormalizedPackageName> for PackageName {
    fn from(value: NormalizedPackageName) -> Self {
        Self {
            source: value.0.clone(),
            normalized: value.0,
        }
    }
}

impl NormalizedPackageName {
    /// Returns the normalized name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NormalizedPackageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NormalizedPackageName {
    type Err = ParsePackageNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PackageName::from_str(s)?.into())
    }
}

impl Serialize for NormalizedPackageName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl Borrow<str> for NormalizedPackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        let name: PackageName = "Frob-Nicator".parse().unwrap();
        assert_eq!(name.as_source_str(), "Frob-Nicator");
        assert_eq!(name.as_str(), "frob-nicator");

        let other: PackageName = "frob_nicator".parse().unwrap();
        assert_eq!(name, other);

        let dotted: PackageName = "frob.nicator".parse().unwrap();
        assert_eq!(name, dotted);
    }

    #[test]
    fn separator_runs_collapse() {
        let name: PackageName = "frob-_.nicator".parse().unwrap();
        assert_eq!(name.as_str(), "frob-nicator");
    }

    #[test]
    fn normalization_is_idempotent() {
        let normalized: NormalizedPackageName = "Frob__Nicator".parse().unwrap();
        let again: NormalizedPackageName = normalized.as_str().parse().unwrap();
        assert_eq!(normalized, again);
    }

    #[test]
    fn rejects_invalid_names() {
        assert!(PackageName::from_str("-frob").is_err());
        assert!(PackageName::from_str("frob-").is_err());
        assert!(PackageName::from_str("").is_err());
        assert!(PackageName::from_str("frob nicator").is_err());
    }
}
