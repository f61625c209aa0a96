//! Resource kinds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Managed service a declaration maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Storage,
    Cdn,
    Table,
    LogGroup,
    Function,
    ApiGateway,
    ResourcePath,
}

impl ResourceKind {
    pub const ALL: &'static [ResourceKind] = &[
        Self::Storage,
        Self::Cdn,
        Self::Table,
        Self::LogGroup,
        Self::Function,
        Self::ApiGateway,
        Self::ResourcePath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Cdn => "cdn",
            Self::Table => "table",
            Self::LogGroup => "log-group",
            Self::Function => "function",
            Self::ApiGateway => "api-gateway",
            Self::ResourcePath => "resource-path",
        }
    }

    /// Kinds that run code and therefore own an execution identity
    pub fn has_execution_identity(&self) -> bool {
        matches!(self, Self::Function)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde_names_match_display() {
        for kind in ResourceKind::ALL {
            let json = serde_json::to_string(kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_only_functions_have_identity() {
        assert!(ResourceKind::Function.has_execution_identity());
        assert!(!ResourceKind::Table.has_execution_identity());
    }
}
