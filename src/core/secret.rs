//! Secret credentials and redaction

use std::collections::BTreeMap;
use std::fmt;

/// Placeholder printed in place of secret values
pub const MASK: &str = "***";

/// An opaque credential; formatting never reveals the value
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value, for binding into a child process environment only
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

/// Secrets available to a run, keyed by environment variable name
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    secrets: BTreeMap<String, Secret>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the named secrets from the host environment
    ///
    /// Names that are unset or empty are left out; the step that needs
    /// them fails when it is reached.
    pub fn from_env<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let secrets = names
            .into_iter()
            .filter_map(|name| {
                let name = name.as_ref();
                std::env::var(name)
                    .ok()
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.to_string(), Secret::new(value)))
            })
            .collect();
        Self { secrets }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), Secret::new(value));
    }

    pub fn get(&self, name: &str) -> Option<&Secret> {
        self.secrets.get(name)
    }

    /// Mask every known secret value in `text`
    pub fn redact(&self, text: &str) -> String {
        redact_all(text, self.secrets.values())
    }
}

/// Replace each secret value occurring in `text` with the mask
pub fn redact_all<'a>(text: &str, secrets: impl IntoIterator<Item = &'a Secret>) -> String {
    let mut values: Vec<&str> = secrets
        .into_iter()
        .map(Secret::expose)
        .filter(|v| !v.is_empty())
        .collect();
    // Longer values first so a secret containing another is masked whole
    values.sort_by_key(|v| std::cmp::Reverse(v.len()));

    let mut redacted = text.to_string();
    for value in values {
        redacted = redacted.replace(value, MASK);
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_formatting_is_masked() {
        let secret = Secret::new("cio_abc123");
        assert_eq!(format!("{}", secret), MASK);
        assert_eq!(format!("{:?}", secret), MASK);
        assert_eq!(secret.expose(), "cio_abc123");

        let store = SecretStore::new().with("CARGO_REGISTRY_TOKEN", "cio_abc123");
        assert!(!format!("{:?}", store).contains("cio_abc123"));
    }

    #[test]
    fn test_redact_masks_all_occurrences() {
        let store = SecretStore::new()
            .with("A", "token")
            .with("B", "token-long");
        let redacted = store.redact("auth token-long then token again");
        assert_eq!(redacted, "auth *** then *** again");
    }

    #[test]
    fn test_from_env_skips_missing_and_empty() {
        std::env::set_var("TAGRELEASE_SECRET_TEST_PRESENT", "value");
        std::env::set_var("TAGRELEASE_SECRET_TEST_EMPTY", "");

        let store = SecretStore::from_env([
            "TAGRELEASE_SECRET_TEST_PRESENT",
            "TAGRELEASE_SECRET_TEST_EMPTY",
            "TAGRELEASE_SECRET_TEST_UNSET",
        ]);

        assert_eq!(
            store.get("TAGRELEASE_SECRET_TEST_PRESENT").map(Secret::expose),
            Some("value")
        );
        assert!(store.get("TAGRELEASE_SECRET_TEST_EMPTY").is_none());
        assert!(store.get("TAGRELEASE_SECRET_TEST_UNSET").is_none());
    }
}
