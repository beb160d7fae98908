//! Identifiers shared across the registry
//!
//! [`PropertyId`] always holds the canonical, unprefixed form. The `#` seen
//! in the dashboard is presentation only and is re-added through
//! [`PropertyId::display_with`].

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Presentation prefix used by the dashboard
pub const DEFAULT_ID_PREFIX: &str = "#";

/// Canonical property identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyId(String);

impl PropertyId {
    /// Parse a raw id, stripping the presentation prefix
    ///
    /// # Errors
    /// - `RegistryError::InvalidRecord` if nothing remains after stripping
    pub fn new(raw: impl AsRef<str>) -> Result<Self, RegistryError> {
        let canonical = canonicalize(raw.as_ref());
        if canonical.is_empty() {
            return Err(RegistryError::invalid("empty property id"));
        }
        Ok(Self(canonical.to_string()))
    }

    /// Canonical form
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Presentation form with the given prefix re-attached
    #[inline]
    #[must_use]
    pub fn display_with(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }
}

fn canonicalize(raw: &str) -> &str {
    raw.trim().trim_start_matches('#').trim()
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PropertyId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PropertyId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PropertyId> for String {
    fn from(value: PropertyId) -> Self {
        value.0
    }
}

/// Opaque applicant/operator identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Wrap a raw identifier
    #[inline]
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Did {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_stripped() {
        let id = PropertyId::new("#H1202").unwrap();
        assert_eq!(id.as_str(), "H1202");
        assert_eq!(id, PropertyId::new("H1202").unwrap());
        assert_eq!(id, PropertyId::new("  #H1202 ").unwrap());
    }

    #[test]
    fn display_readds_prefix() {
        let id = PropertyId::new("H1235").unwrap();
        assert_eq!(id.display_with(DEFAULT_ID_PREFIX), "#H1235");
        assert_eq!(id.to_string(), "H1235");
    }

    #[test]
    fn empty_id_rejected() {
        assert!(PropertyId::new("#").is_err());
        assert!(PropertyId::new("   ").is_err());
    }

    #[test]
    fn serde_uses_canonical_form() {
        let id: PropertyId = serde_json::from_str("\"#H1240\"").unwrap();
        assert_eq!(id.as_str(), "H1240");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"H1240\"");
    }
}
