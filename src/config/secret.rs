//! Connection strings kept out of logs
//!
//! DSNs carry database passwords. They are held as [`SecretString`], which
//! redacts `Debug` output and zeroes the buffer on drop; code that needs the
//! raw value goes through `expose_secret()`, and code that only wants to
//! show where it connects uses [`SecretValue::redacted_dsn`].

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Raw secret text, only reachable through [`SecretString`]
#[derive(Clone, Debug, Zeroize, Serialize, Deserialize)]
#[serde(transparent)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl SecretValue {
    /// `scheme://***@host/db`, or the value unchanged when it has no userinfo
    pub fn redacted_dsn(&self) -> String {
        let Some((scheme_and_user, host)) = self.0.rsplit_once('@') else {
            return self.0.clone();
        };
        let scheme = scheme_and_user
            .split_once("://")
            .map_or("postgresql", |(scheme, _)| scheme);
        format!("{scheme}://***@{host}")
    }
}

/// Connection string wrapped in [`Secret`]
pub type SecretString = Secret<SecretValue>;

/// Wrap a plain string read from configuration or the environment
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use test_case::test_case;

    #[test_case("postgres://moodle:hunter2@db:5432/moodle", "postgres://***@db:5432/moodle" ; "user and password")]
    #[test_case("postgresql://moodle@db/moodle", "postgresql://***@db/moodle" ; "user only")]
    #[test_case("postgresql://db/moodle", "postgresql://db/moodle" ; "no userinfo")]
    #[test_case("p@ss@db/moodle", "postgresql://***@db/moodle" ; "no scheme")]
    fn test_redacted_dsn(dsn: &str, expected: &str) {
        let secret = secret_string(dsn.to_string());
        assert_eq!(secret.expose_secret().redacted_dsn(), expected);
    }

    #[test]
    fn test_debug_output_hides_password() {
        let dsn = secret_string("postgresql://moodle:hunter2@db/moodle".to_string());
        let debug_output = format!("{dsn:?}");
        assert!(!debug_output.contains("hunter2"));
    }

    #[test]
    fn test_deserializes_from_plain_string() {
        #[derive(Deserialize)]
        struct Source {
            connection_string: SecretString,
        }

        let source: Source =
            toml::from_str(r#"connection_string = "postgresql://moodle:pw@db/moodle""#).unwrap();
        assert_eq!(
            source.connection_string.expose_secret(),
            "postgresql://moodle:pw@db/moodle"
        );
    }
}
