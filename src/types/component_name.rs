// ABOUTME: DNS-compatible component name validation.
// ABOUTME: Component names key revision history, lock files, and log output.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComponentNameError {
    #[error("component name cannot be empty")]
    Empty,

    #[error("component name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("component name cannot start with a hyphen")]
    StartsWithHyphen,

    #[error("component name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("component name must be lowercase")]
    NotLowercase,

    #[error("invalid character in component name: '{0}'")]
    InvalidChar(char),
}

/// Name of a tracked code component (backend, frontend, devops...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentName(String);

impl ComponentName {
    pub fn new(value: &str) -> Result<Self, ComponentNameError> {
        if value.is_empty() {
            return Err(ComponentNameError::Empty);
        }

        if value.len() > 63 {
            return Err(ComponentNameError::TooLong);
        }

        if value.starts_with('-') {
            return Err(ComponentNameError::StartsWithHyphen);
        }

        if value.ends_with('-') {
            return Err(ComponentNameError::EndsWithHyphen);
        }

        for c in value.chars() {
            if c.is_ascii_uppercase() {
                return Err(ComponentNameError::NotLowercase);
            }
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
                return Err(ComponentNameError::InvalidChar(c));
            }
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ComponentName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ComponentName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        ComponentName::new(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_typical_names() {
        for name in ["backend", "frontend", "devops", "api-v2", "a"] {
            assert!(ComponentName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn rejects_invalid_names() {
        assert_eq!(ComponentName::new(""), Err(ComponentNameError::Empty));
        assert_eq!(
            ComponentName::new("-api"),
            Err(ComponentNameError::StartsWithHyphen)
        );
        assert_eq!(
            ComponentName::new("api-"),
            Err(ComponentNameError::EndsWithHyphen)
        );
        assert_eq!(
            ComponentName::new("Backend"),
            Err(ComponentNameError::NotLowercase)
        );
        assert_eq!(
            ComponentName::new("back_end"),
            Err(ComponentNameError::InvalidChar('_'))
        );
        assert_eq!(
            ComponentName::new(&"a".repeat(64)),
            Err(ComponentNameError::TooLong)
        );
    }

    #[test]
    fn deserializes_with_validation() {
        let name: ComponentName = serde_yaml::from_str("backend").unwrap();
        assert_eq!(name.as_str(), "backend");

        let err = serde_yaml::from_str::<ComponentName>("Back End").unwrap_err();
        assert!(err.to_string().contains("lowercase"));
    }
}
