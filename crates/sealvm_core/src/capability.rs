//! Named host capabilities.
//!
//! A contract declares the capabilities it needs; the host is configured
//! with the capabilities it supports. A module is only admitted when every
//! required capability is supported.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A capability name such as `iterator` or `staking`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Capability(String);

impl Capability {
    /// Create a capability, validating the name
    ///
    /// Names are non-empty and made of ASCII alphanumerics and underscores.
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty or has other characters
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::InvalidCapability {
                reason: "empty name".to_string(),
            });
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
        {
            return Err(CoreError::InvalidCapability {
                reason: format!("unexpected character {:?} in {:?}", c, name),
            });
        }
        Ok(Self(name))
    }

    /// Get the name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Capability {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.0
    }
}

/// An ordered set of capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet {
    capabilities: BTreeSet<Capability>,
}

impl CapabilitySet {
    /// Create a new empty capability set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated list, ignoring whitespace and empty entries
    ///
    /// # Errors
    ///
    /// Returns error if an entry is not a valid capability name
    pub fn parse_list(list: &str) -> Result<Self, CoreError> {
        let mut set = Self::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            set.insert(Capability::new(entry)?);
        }
        Ok(set)
    }

    /// Render as a comma separated list in sorted order
    #[must_use]
    pub fn to_list(&self) -> String {
        self.capabilities
            .iter()
            .map(Capability::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Add a capability
    pub fn insert(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
    }

    /// Check if a capability is present
    #[must_use]
    pub fn contains(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Capabilities of `required` that are not in this set
    #[must_use]
    pub fn missing(&self, required: &CapabilitySet) -> CapabilitySet {
        CapabilitySet {
            capabilities: required
                .capabilities
                .difference(&self.capabilities)
                .cloned()
                .collect(),
        }
    }

    /// Check whether every capability of `required` is present
    #[must_use]
    pub fn supports(&self, required: &CapabilitySet) -> bool {
        required.capabilities.is_subset(&self.capabilities)
    }

    /// Iterate in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    /// Number of capabilities
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl FromStr for CapabilitySet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_list(s)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            capabilities: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(name: &str) -> Capability {
        Capability::new(name).unwrap()
    }

    #[test]
    fn test_capability_validation() {
        assert!(Capability::new("iterator").is_ok());
        assert!(Capability::new("cosmwasm_1_2").is_ok());
        assert!(Capability::new("").is_err());
        assert!(Capability::new("bad-name").is_err());
        assert!(Capability::new("has space").is_err());
    }

    #[test]
    fn test_parse_list() {
        let set = CapabilitySet::parse_list(" staking, iterator,,staking ").unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.to_list(), "iterator,staking");
    }

    #[test]
    fn test_parse_empty_list() {
        let set = CapabilitySet::parse_list("").unwrap();
        assert!(set.is_empty());
        assert_eq!(set.to_list(), "");
    }

    #[test]
    fn test_supports_and_missing() {
        let supported = CapabilitySet::parse_list("iterator,staking").unwrap();
        let required = CapabilitySet::parse_list("iterator").unwrap();
        assert!(supported.supports(&required));

        let required = CapabilitySet::parse_list("iterator,stargate").unwrap();
        assert!(!supported.supports(&required));
        let missing = supported.missing(&required);
        assert_eq!(missing.len(), 1);
        assert!(missing.contains(&cap("stargate")));
    }

    #[test]
    fn test_empty_requirement_always_supported() {
        assert!(CapabilitySet::new().supports(&CapabilitySet::new()));
    }

    #[test]
    fn test_capability_set_json() {
        let set: CapabilitySet = "staking,iterator".parse().unwrap();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[\"iterator\",\"staking\"]");
        assert!(serde_json::from_str::<CapabilitySet>("[\"no-dash\"]").is_err());
    }
}
