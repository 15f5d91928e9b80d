//! Domain identifier types with validation
//!
//! Datatype names are used as artifact file names, state keys and log fields,
//! so they are restricted to lowercase ASCII letters, digits and underscores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a logical export stream, e.g. `users` or `quizattempts`
///
/// # Examples
///
/// ```
/// use quarry::domain::ids::DatatypeName;
/// use std::str::FromStr;
///
/// let name = DatatypeName::from_str("quizattempts").unwrap();
/// assert_eq!(name.as_str(), "quizattempts");
/// assert!(DatatypeName::from_str("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatatypeName(String);

impl DatatypeName {
    /// Creates a new DatatypeName from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(DatatypeName)` if the name is valid, `Err` otherwise
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Datatype name cannot be empty".to_string());
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(format!(
                "Invalid datatype name '{name}'. Only lowercase letters, digits and '_' are allowed"
            ));
        }

        Ok(Self(name))
    }

    /// Returns the datatype name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for DatatypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatatypeName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DatatypeName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DatatypeName> for String {
    fn from(name: DatatypeName) -> Self {
        name.0
    }
}

impl AsRef<str> for DatatypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for DatatypeName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for DatatypeName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_name_valid() {
        let name = DatatypeName::new("assign_submissions").unwrap();
        assert_eq!(name.as_str(), "assign_submissions");
        assert_eq!(name.to_string(), "assign_submissions");
        assert_eq!(name, "assign_submissions");
    }

    #[test]
    fn test_datatype_name_rejects_empty() {
        assert!(DatatypeName::new("").is_err());
        assert!(DatatypeName::new("   ").is_err());
    }

    #[test]
    fn test_datatype_name_rejects_path_characters() {
        assert!(DatatypeName::new("users/../x").is_err());
        assert!(DatatypeName::new("Users").is_err());
        assert!(DatatypeName::new("forum-posts").is_err());
    }

    #[test]
    fn test_datatype_name_serde_validates() {
        let ok: DatatypeName = serde_json::from_str("\"courses\"").unwrap();
        assert_eq!(ok.as_str(), "courses");

        let bad = serde_json::from_str::<DatatypeName>("\"Bad Name\"");
        assert!(bad.is_err());
    }
}
