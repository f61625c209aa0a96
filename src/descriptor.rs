//! Deployment descriptor
//!
//! The root aggregate for one deployment: every declaration, grant, route
//! binding and named output. It is passed explicitly to every registration
//! call; nothing is registered through ambient state. External
//! materialization happens only in [`crate::synth::synthesize`].

use crate::error::{DeployError, Result};
use crate::grant::GrantEdge;
use crate::resource::{AttributeRef, Options, ResourceDeclaration, ResourceKind};
use crate::route::{self, RouteBinding};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Longest accepted stack name
const MAX_STACK_NAME: usize = 40;

/// Target account and region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: &str, region: &str) -> Self {
        Self {
            account: account.to_string(),
            region: region.to_string(),
        }
    }

    fn validate(&self, stack: &str) -> Result<()> {
        if self.account.len() != 12 || !self.account.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DeployError::validation(
                stack,
                format!("account '{}' must be a 12-digit number", self.account),
            ));
        }
        // e.g. us-east-1, ap-southeast-2, us-gov-west-1
        let parts: Vec<&str> = self.region.split('-').collect();
        let region_ok = parts.len() >= 3
            && parts[..parts.len() - 1]
                .iter()
                .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_lowercase()))
            && parts[parts.len() - 1].bytes().all(|b| b.is_ascii_digit())
            && !parts[parts.len() - 1].is_empty();
        if !region_ok {
            return Err(DeployError::validation(
                stack,
                format!("region '{}' is not a valid region name", self.region),
            ));
        }
        Ok(())
    }
}

/// Named output: a generated attribute surfaced to humans and automation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedOutput {
    pub value: AttributeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Graph of declared resources and edges for one deployment
#[derive(Debug, Clone)]
pub struct Descriptor {
    name: String,
    environment: Environment,
    declarations: Vec<ResourceDeclaration>,
    index: HashMap<String, usize>,
    grants: Vec<GrantEdge>,
    routes: Vec<RouteBinding>,
    outputs: BTreeMap<String, NamedOutput>,
}

impl Descriptor {
    /// Create an empty descriptor for stack `name`
    pub fn new(name: &str, environment: Environment) -> Result<Self> {
        let name_ok = name.len() <= MAX_STACK_NAME
            && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !name_ok {
            return Err(DeployError::validation(
                name,
                format!(
                    "stack name must start with a lowercase letter, contain only lowercase letters, digits or '-', and be at most {} characters",
                    MAX_STACK_NAME
                ),
            ));
        }
        environment.validate(name)?;

        Ok(Self {
            name: name.to_string(),
            environment,
            declarations: Vec::new(),
            index: HashMap::new(),
            grants: Vec::new(),
            routes: Vec::new(),
            outputs: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Declarations in registration order
    pub fn declarations(&self) -> &[ResourceDeclaration] {
        &self.declarations
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDeclaration> {
        self.index.get(id).map(|i| &self.declarations[*i])
    }

    pub fn grants(&self) -> &[GrantEdge] {
        &self.grants
    }

    pub fn routes(&self) -> &[RouteBinding] {
        &self.routes
    }

    pub fn outputs(&self) -> &BTreeMap<String, NamedOutput> {
        &self.outputs
    }

    /// Validate and register a declaration
    pub fn declare(&mut self, id: &str, kind: ResourceKind, config: Options) -> Result<&ResourceDeclaration> {
        if self.index.contains_key(id) {
            return Err(DeployError::validation(id, "declaration id is already in use"));
        }
        let decl = ResourceDeclaration::declare(id, kind, config)?;
        tracing::debug!(id, kind = %kind, "declared resource");
        Ok(self.register(decl))
    }

    fn register(&mut self, decl: ResourceDeclaration) -> &ResourceDeclaration {
        let position = self.declarations.len();
        self.index.insert(decl.id.clone(), position);
        self.declarations.push(decl);
        &self.declarations[position]
    }

    /// Grant `principal`'s execution identity `actions` on `target`
    ///
    /// Granting an identical edge twice registers it once.
    pub fn grant<I, S>(&mut self, principal: &str, target: &str, actions: I) -> Result<GrantEdge>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(principal_decl) = self.get(principal) else {
            return Err(DeployError::unresolved(principal, target, "grant principal is not declared"));
        };
        let Some(target_decl) = self.get(target) else {
            return Err(DeployError::unresolved(principal, target, "grant target is not declared"));
        };

        let edge = GrantEdge::new(principal_decl, target_decl, actions)?;
        if !self.grants.contains(&edge) {
            tracing::debug!(principal, target, actions = ?edge.actions, "registered grant");
            self.grants.push(edge.clone());
        }
        Ok(edge)
    }

    /// Bind a route, creating the gateway resource paths it needs
    pub fn bind(&mut self, binding: RouteBinding) -> Result<()> {
        route::check_binding(&self.routes, &binding, |id| self.get(id))?;

        for decl in route::path_declarations(&binding.gateway, &binding.path)? {
            if !self.index.contains_key(&decl.id) {
                self.register(decl);
            }
        }

        tracing::debug!(
            method = %binding.method,
            path = %binding.path,
            handler = %binding.handler,
            authorization = binding.authorization.as_str(),
            "bound route"
        );
        self.routes.push(binding);
        Ok(())
    }

    /// Register a named output
    pub fn output(&mut self, name: &str, value: AttributeRef, description: Option<&str>) -> Result<()> {
        let name_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric());
        if !name_ok {
            return Err(DeployError::validation(
                name,
                "output name must be alphanumeric and start with a letter",
            ));
        }
        if self.outputs.contains_key(name) {
            return Err(DeployError::validation(name, "output name is already in use"));
        }
        self.outputs.insert(
            name.to_string(),
            NamedOutput {
                value,
                description: description.map(str::to_string),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::options;
    use crate::route::{Authorization, HttpMethod};

    fn descriptor() -> Descriptor {
        Descriptor::new("demo", Environment::new("123456789012", "us-east-1")).unwrap()
    }

    fn with_function(d: &mut Descriptor) {
        d.declare(
            "items-fn",
            ResourceKind::Function,
            options([
                ("runtimeId", "nodejs20.x".into()),
                ("handlerEntry", "index.handler".into()),
                ("codeLocation", "lambda/".into()),
            ]),
        )
        .unwrap();
    }

    #[test]
    fn test_rejects_bad_environment() {
        assert!(Descriptor::new("demo", Environment::new("123", "us-east-1")).is_err());
        assert!(Descriptor::new("demo", Environment::new("123456789012", "useast1")).is_err());
        assert!(Descriptor::new("Demo", Environment::new("123456789012", "us-east-1")).is_err());
        assert!(Descriptor::new("demo", Environment::new("123456789012", "us-gov-west-1")).is_ok());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut d = descriptor();
        d.declare("b", ResourceKind::Storage, Options::new()).unwrap();
        let err = d.declare("b", ResourceKind::Storage, Options::new()).unwrap_err();
        assert!(err.to_string().contains("already in use"));
    }

    #[test]
    fn test_grant_requires_declared_resources() {
        let mut d = descriptor();
        with_function(&mut d);
        let err = d.grant("items-fn", "items-table", ["read"]).unwrap_err();
        assert!(matches!(err, DeployError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_grant_is_idempotent() {
        let mut d = descriptor();
        with_function(&mut d);
        d.declare(
            "items-table",
            ResourceKind::Table,
            options([
                ("partitionKeyName", "id".into()),
                ("partitionKeyType", "STRING".into()),
            ]),
        )
        .unwrap();

        let first = d.grant("items-fn", "items-table", ["read"]).unwrap();
        let second = d.grant("items-fn", "items-table", ["read"]).unwrap();
        assert_eq!(first, second);
        assert_eq!(d.grants().len(), 1);
    }

    #[test]
    fn test_bind_creates_path_declarations_once() {
        let mut d = descriptor();
        with_function(&mut d);
        d.declare("api", ResourceKind::ApiGateway, Options::new()).unwrap();

        for method in [HttpMethod::Get, HttpMethod::Post] {
            d.bind(RouteBinding::new(
                "api",
                "/items/{id}".parse().unwrap(),
                method,
                "items-fn",
                Authorization::RequireIam,
            ))
            .unwrap();
        }

        let paths: Vec<&str> = d
            .declarations()
            .iter()
            .filter(|decl| decl.kind == ResourceKind::ResourcePath)
            .map(|decl| decl.id.as_str())
            .collect();
        assert_eq!(paths, vec!["api/items", "api/items/{id}"]);
        assert_eq!(d.routes().len(), 2);
    }

    #[test]
    fn test_output_names_unique() {
        let mut d = descriptor();
        let value = AttributeRef::new("b", "bucketName");
        d.output("bucketName", value.clone(), None).unwrap();
        assert!(d.output("bucketName", value.clone(), None).is_err());
        assert!(d.output("bucket-name", value, None).is_err());
    }
}
