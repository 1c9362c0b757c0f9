//! Field-level validation collecting `field -> message` pairs.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::BTreeMap, collections::HashSet, hash::Hash};

use super::error::ApiError;

static EMAIL_RX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Record an error unless the field already has one.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    /// # Errors
    /// Returns `ApiError::ValidationFailed` with every recorded error.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::ValidationFailed(self.errors))
        }
    }
}

pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|value| seen.insert(value))
}

/// Basic email format check on already-normalized input.
pub fn valid_email(email: &str) -> bool {
    EMAIL_RX.as_ref().is_some_and(|regex| regex.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "title", "must be provided");
        v.check(false, "title", "must not be more than 80 bytes long");
        v.check(true, "price", "must be provided");
        assert!(!v.valid());
        match v.finish() {
            Err(ApiError::ValidationFailed(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors.get("title").map(String::as_str), Some("must be provided"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unique_detects_duplicates() {
        assert!(unique(&["road", "gravel"]));
        assert!(!unique(&["road", "road"]));
        assert!(unique::<&str>(&[]));
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("rider@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }
}
