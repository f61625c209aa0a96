//! Error taxonomy
//!
//! Every failure aborts the whole assembly/synthesis run. Messages always
//! name the offending declaration id and the violated constraint.

use thiserror::Error;

/// Errors raised while declaring, resolving or synthesizing a descriptor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    /// Malformed or out-of-range configuration
    #[error("validation failed for '{id}': {constraint}")]
    Validation {
        /// Declaration (or stack) the violation belongs to
        id: String,
        /// Human readable description of the violated constraint
        constraint: String,
    },

    /// Dangling or cyclic reference
    #[error("unresolved reference from '{from}' to '{to}': {reason}")]
    UnresolvedReference {
        /// Consuming declaration
        from: String,
        /// Referenced declaration
        to: String,
        reason: String,
    },

    /// Two bindings share the same (path, method)
    #[error("route {method} {path} is already bound")]
    DuplicateRoute { path: String, method: String },

    /// Route handler is missing or not a function
    #[error("invalid handler '{handler}': {reason}")]
    InvalidHandler { handler: String, reason: String },

    /// Failure while materializing the template
    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

impl DeployError {
    pub fn validation(id: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::Validation {
            id: id.into(),
            constraint: constraint.into(),
        }
    }

    pub fn unresolved(
        from: impl Into<String>,
        to: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnresolvedReference {
            from: from.into(),
            to: to.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience result type for descriptor operations
pub type Result<T> = std::result::Result<T, DeployError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_id_and_constraint() {
        let err = DeployError::validation("items-table", "missing required option 'partitionKeyType'");
        let msg = err.to_string();
        assert!(msg.contains("items-table"));
        assert!(msg.contains("partitionKeyType"));
    }

    #[test]
    fn test_duplicate_route_message() {
        let err = DeployError::DuplicateRoute {
            path: "/items".to_string(),
            method: "GET".to_string(),
        };
        assert_eq!(err.to_string(), "route GET /items is already bound");
    }
}
