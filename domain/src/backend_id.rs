use std::fmt;

use crate::error::TaskError;

/// A short ASCII backend identifier, `[a-z][a-z0-9-]*`. Used both as the
/// registry lookup key and as the cache partition tag, so it is validated
/// once at construction rather than at every call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(value: impl Into<String>) -> Result<Self, TaskError> {
        let value = value.into();
        let mut chars = value.chars();
        let valid = match chars.next() {
            Some(first) if first.is_ascii_lowercase() => chars
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            _ => false,
        };
        if !valid {
            return Err(TaskError::invalid_input_with_suggestion(
                format!("invalid backend name: {value}"),
                "backend names must match [a-z][a-z0-9-]*",
            ));
        }
        Ok(BackendId(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for BackendId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_alnum_and_hyphen() {
        assert!(BackendId::new("nextcloud-prod").is_ok());
        assert!(BackendId::new("sqlite").is_ok());
        assert!(BackendId::new("a1").is_ok());
    }

    #[test]
    fn rejects_uppercase_leading_digit_and_empty() {
        assert!(BackendId::new("Sqlite").is_err());
        assert!(BackendId::new("1sqlite").is_err());
        assert!(BackendId::new("").is_err());
    }
}
