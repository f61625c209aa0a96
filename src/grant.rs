//! Grant/Policy propagation
//!
//! A grant authorizes the execution identity of a principal (a Function) to
//! perform abstract actions on a target. Grants are validated against the
//! target kind's action vocabulary and emitted as least-privilege statements
//! scoped to the target's generated ARN. Nothing is granted implicitly.

use crate::error::{DeployError, Result};
use crate::resolve::Materialized;
use crate::resource::{schema, ResourceDeclaration, ResourceKind};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Authorization of `principal` to perform `actions` on `target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GrantEdge {
    pub principal: String,
    pub target: String,
    pub actions: BTreeSet<String>,
}

impl GrantEdge {
    /// Validate a grant between two declared resources
    pub fn new<I, S>(
        principal: &ResourceDeclaration,
        target: &ResourceDeclaration,
        actions: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !principal.kind.has_execution_identity() {
            return Err(DeployError::validation(
                &principal.id,
                format!(
                    "kind '{}' has no execution identity and cannot be a grant principal",
                    principal.kind
                ),
            ));
        }
        if principal.id == target.id {
            return Err(DeployError::validation(
                &principal.id,
                "a resource cannot be granted access to itself",
            ));
        }

        let actions: BTreeSet<String> = actions
            .into_iter()
            .map(|a| a.as_ref().to_string())
            .collect();
        if actions.is_empty() {
            return Err(DeployError::validation(
                &principal.id,
                format!("grant on '{}' names no actions", target.id),
            ));
        }

        let vocabulary = schema(target.kind).action_names();
        if let Some(bad) = actions.iter().find(|a| !vocabulary.contains(&a.as_str())) {
            return Err(DeployError::validation(
                &principal.id,
                format!(
                    "action '{}' is not allowed on {} '{}' (allowed: [{}])",
                    bad,
                    target.kind,
                    target.id,
                    vocabulary.join(", ")
                ),
            ));
        }

        Ok(Self {
            principal: principal.id.clone(),
            target: target.id.clone(),
            actions,
        })
    }
}

/// Effective permission statement attached to a principal's execution role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatement {
    pub sid: String,
    pub principal: String,
    pub target: String,
    /// Abstract actions, exactly as granted
    pub actions: BTreeSet<String>,
    /// Provider actions the abstract ones expand to
    pub provider_actions: BTreeSet<String>,
    /// Target ARNs the statement is scoped to
    pub resources: Vec<String>,
}

impl PolicyStatement {
    /// IAM policy document statement
    pub fn to_document(&self) -> Value {
        json!({
            "Sid": self.sid,
            "Effect": "Allow",
            "Action": self.provider_actions,
            "Resource": self.resources,
        })
    }
}

/// Merge grant edges into one statement per (principal, target)
///
/// Identical grants collapse, and grants of different actions on the same
/// target accumulate into a single statement.
pub fn emit_statements(grants: &[GrantEdge], materialized: &Materialized) -> Result<Vec<PolicyStatement>> {
    let mut merged: BTreeMap<(&str, &str), BTreeSet<String>> = BTreeMap::new();
    for grant in grants {
        merged
            .entry((grant.principal.as_str(), grant.target.as_str()))
            .or_default()
            .extend(grant.actions.iter().cloned());
    }

    let mut statements = Vec::with_capacity(merged.len());
    for ((principal, target), actions) in merged {
        let target_decl = materialized.declaration(target).ok_or_else(|| {
            DeployError::unresolved(principal, target, "grant target was never materialized")
        })?;
        let arn = target_decl.attribute("arn").ok_or_else(|| {
            DeployError::Synthesis(format!("'{}' has no generated arn", target))
        })?;

        let kind_schema = schema(target_decl.kind);
        let provider_actions: BTreeSet<String> = actions
            .iter()
            .filter_map(|a| kind_schema.actions.get(a))
            .flatten()
            .cloned()
            .collect();

        // bucket actions apply to the bucket, object actions to its keys
        let resources = if target_decl.kind == ResourceKind::Storage {
            let mut scoped = Vec::new();
            if actions.contains("list") {
                scoped.push(arn.to_string());
            }
            if actions.iter().any(|a| a == "read" || a == "write") {
                scoped.push(format!("{}/*", arn));
            }
            scoped
        } else {
            vec![arn.to_string()]
        };

        let sid = format!(
            "{}{}",
            materialized.logical_id(principal).unwrap_or(principal),
            materialized.logical_id(target).unwrap_or(target)
        );

        tracing::debug!(principal, target, ?actions, "emitting policy statement");

        statements.push(PolicyStatement {
            sid,
            principal: principal.to_string(),
            target: target.to_string(),
            actions,
            provider_actions,
            resources,
        });
    }

    Ok(statements)
}
