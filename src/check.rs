//! Conformance check
//!
//! Flags risky but valid configuration. Findings never block synthesis;
//! `--strict` on the command line turns High findings into a failure.

use crate::descriptor::Descriptor;
use crate::resource::ResourceKind;
use crate::route::Authorization;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    /// Declaration id, or `METHOD /path` for routes
    pub id: String,
    pub message: String,
}

impl Finding {
    fn new(severity: Severity, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Findings for `descriptor`, most severe first
pub fn check(descriptor: &Descriptor) -> Vec<Finding> {
    let mut findings = Vec::new();

    for route in descriptor.routes() {
        if route.authorization == Authorization::None {
            findings.push(Finding::new(
                Severity::High,
                format!("{} {}", route.method, route.path),
                format!("route on '{}' is unauthenticated", route.gateway),
            ));
        }
    }

    for decl in descriptor.declarations() {
        let id = decl.id.as_str();
        match decl.kind {
            ResourceKind::Storage => {
                if decl.bool_opt("publicAccess") {
                    findings.push(Finding::new(Severity::High, id, "bucket allows public reads"));
                }
                if !decl.bool_opt("enforceTLS") {
                    findings.push(Finding::new(
                        Severity::Medium,
                        id,
                        "bucket accepts requests without TLS",
                    ));
                }
                if decl.str_opt("encryption") == Some("UNENCRYPTED") {
                    findings.push(Finding::new(Severity::Medium, id, "bucket is not encrypted at rest"));
                }
            }
            ResourceKind::ApiGateway => {
                if decl.list_opt("corsAllowOrigins").contains(&"*") {
                    findings.push(Finding::new(
                        Severity::Medium,
                        id,
                        "CORS allows every origin",
                    ));
                }
            }
            ResourceKind::Function => {
                if !decl.bool_opt("tracingEnabled") {
                    findings.push(Finding::new(Severity::Low, id, "tracing is disabled"));
                }
            }
            ResourceKind::Table => {
                if !decl.bool_opt("pointInTimeRecovery") {
                    findings.push(Finding::new(
                        Severity::Low,
                        id,
                        "point-in-time recovery is disabled",
                    ));
                }
            }
            ResourceKind::Cdn | ResourceKind::LogGroup | ResourceKind::ResourcePath => {}
        }
    }

    // stable: program order within a severity
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    for finding in &findings {
        tracing::warn!(severity = %finding.severity, id = %finding.id, "{}", finding.message);
    }
    findings
}
