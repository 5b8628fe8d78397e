use std::fmt;

use serde::Serialize;
use tracing::warn;

/// Identity of a cached query: an operation name plus its parameters.
///
/// Parameters are stored as canonical JSON, so two keys built from equal
/// parameter values are equal. Operation names are dotted
/// (`users.list`, `users.detail`) and [`QueryKey::matches_prefix`] selects
/// whole groups of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    operation: String,
    params: String,
}

impl QueryKey {
    /// Key for a parameterless operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: String::new(),
        }
    }

    pub fn with_params<P: Serialize + ?Sized>(operation: impl Into<String>, params: &P) -> Self {
        let operation = operation.into();
        let params = match serde_json::to_value(params) {
            // Value's map is ordered, so this is stable regardless of field order
            Ok(value) => value.to_string(),
            Err(e) => {
                warn!(operation = %operation, error = %e, "Failed to serialize query params");
                String::new()
            }
        };
        Self { operation, params }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    /// `users` matches `users`, `users.list` and `users.detail`, not `usersx`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        match self.operation.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.operation)
        } else {
            write!(f, "{}{}", self.operation, self.params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{UserFilters, UserRole};

    #[test]
    fn test_equal_params_give_equal_keys() {
        let a = QueryKey::with_params("users.list", &UserFilters::default().page(2).role(UserRole::Admin));
        let b = QueryKey::with_params("users.list", &UserFilters::default().role(UserRole::Admin).page(2));
        assert_eq!(a, b);

        let c = QueryKey::with_params("users.list", &UserFilters::default().page(3));
        assert_ne!(a, c);
    }

    #[test]
    fn test_matches_prefix() {
        let key = QueryKey::with_params("users.detail", "user_1");
        assert!(key.matches_prefix("users"));
        assert!(key.matches_prefix("users.detail"));
        assert!(!key.matches_prefix("user"));
        assert!(!key.matches_prefix("dashboard"));
    }

    #[test]
    fn test_display() {
        assert_eq!(QueryKey::new("dashboard.stats").to_string(), "dashboard.stats");
        assert_eq!(QueryKey::with_params("users.detail", "u1").to_string(), "users.detail\"u1\"");
    }
}
