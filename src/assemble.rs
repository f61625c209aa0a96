//! Stack files
//!
//! A stack file is the authored form of a descriptor, in YAML or JSON
//! (picked by extension). Assembly replays it through the descriptor's
//! registration calls in file order, so every check that applies to
//! programmatic declarations applies to files too.

use crate::descriptor::{Descriptor, Environment};
use crate::error::{DeployError, Result};
use crate::resource::{AttributeRef, Options, ResourceKind};
use crate::route::{Authorization, HttpMethod, RouteBinding, RoutePath};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub id: String,
    pub kind: ResourceKind,
    #[serde(default)]
    pub config: Options,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrantSpec {
    pub principal: String,
    pub target: String,
    pub actions: Vec<String>,
}

/// One path bound for one or more methods on the same handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSpec {
    pub gateway: String,
    pub path: RoutePath,
    pub methods: Vec<HttpMethod>,
    pub handler: String,
    /// Required, no default
    pub authorization: Authorization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    #[serde(rename = "ref")]
    pub target: String,
    pub attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Authored deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    pub name: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    #[serde(default)]
    pub grants: Vec<GrantSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
}

impl StackFile {
    /// Parse a stack file; `.json` is JSON, anything else YAML
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stack file {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let stack = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse {} as JSON", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse {} as YAML", path.display()))?
        };
        tracing::debug!("Loaded stack file {:?}", path);
        Ok(stack)
    }
}

/// Build a descriptor from a stack file
pub fn assemble(stack: &StackFile, environment: Environment) -> Result<Descriptor> {
    let mut descriptor = Descriptor::new(&stack.name, environment)?;

    for resource in &stack.resources {
        descriptor.declare(&resource.id, resource.kind, resource.config.clone())?;
    }

    for grant in &stack.grants {
        descriptor.grant(&grant.principal, &grant.target, &grant.actions)?;
    }

    for route in &stack.routes {
        if route.methods.is_empty() {
            return Err(DeployError::validation(
                &route.gateway,
                format!("route {} names no methods", route.path),
            ));
        }
        for method in &route.methods {
            descriptor.bind(RouteBinding::new(
                &route.gateway,
                route.path.clone(),
                *method,
                &route.handler,
                route.authorization,
            ))?;
        }
    }

    for (name, output) in &stack.outputs {
        descriptor.output(
            name,
            AttributeRef::new(&output.target, &output.attribute),
            output.description.as_deref(),
        )?;
    }

    tracing::info!(
        stack = %stack.name,
        declarations = descriptor.declarations().len(),
        grants = descriptor.grants().len(),
        routes = descriptor.routes().len(),
        "assembled descriptor"
    );
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK: &str = r#"
name: shop
resources:
  - id: items-table
    kind: table
    config:
      partitionKeyName: id
      partitionKeyType: STRING
  - id: items-fn
    kind: function
    config:
      runtimeId: nodejs20.x
      handlerEntry: index.handler
      codeLocation: dist/
      table: { ref: items-table, attribute: arn }
  - id: api
    kind: api-gateway
grants:
  - principal: items-fn
    target: items-table
    actions: [read, write]
routes:
  - gateway: api
    path: /items
    methods: [GET, POST]
    handler: items-fn
    authorization: requireIAM
outputs:
  ApiUrl:
    ref: api
    attribute: url
"#;

    fn env() -> Environment {
        Environment::new("123456789012", "us-east-1")
    }

    #[test]
    fn test_assemble_yaml() {
        let stack: StackFile = serde_yaml::from_str(STACK).unwrap();
        let d = assemble(&stack, env()).unwrap();
        assert_eq!(d.routes().len(), 2);
        assert_eq!(d.grants().len(), 1);
        assert!(d.get("api/items").is_some());
        assert!(d.outputs().contains_key("ApiUrl"));
        assert_eq!(
            d.get("items-fn").unwrap().ref_opt("table"),
            Some(&AttributeRef::new("items-table", "arn"))
        );
    }

    #[test]
    fn test_authorization_is_required() {
        let missing = STACK.replace("    authorization: requireIAM\n", "");
        assert!(serde_yaml::from_str::<StackFile>(&missing).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bad = STACK.replace("kind: table", "kind: queue");
        assert!(serde_yaml::from_str::<StackFile>(&bad).is_err());
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let stack: StackFile = serde_yaml::from_str(STACK).unwrap();

        let json_path = dir.path().join("stack.json");
        std::fs::write(&json_path, serde_json::to_string(&stack).unwrap()).unwrap();
        assert_eq!(StackFile::load(&json_path).unwrap(), stack);

        let yaml_path = dir.path().join("stack.yml");
        std::fs::write(&yaml_path, STACK).unwrap();
        assert_eq!(StackFile::load(&yaml_path).unwrap(), stack);

        assert!(StackFile::load(&dir.path().join("missing.yaml")).is_err());
    }
}
