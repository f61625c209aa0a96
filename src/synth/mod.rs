//! Synthesis
//!
//! Turns a [`Descriptor`] into a deployable [`Artifact`]. Synthesis is a pure
//! function of the descriptor: it performs no I/O and reads no clock, so the
//! same descriptor always yields a byte-identical artifact.

mod emit;
pub mod naming;
mod template;

pub use template::{Template, TemplateOutput, TemplateResource};

use crate::descriptor::{Descriptor, Environment};
use crate::error::{DeployError, Result};
use crate::grant::{self, PolicyStatement};
use crate::resolve::{self, MaterializedResource};
use crate::route::{self, HttpMethod, RouteEntry};
use serde::Serialize;
use std::collections::BTreeMap;

/// Provider-consumable description of the whole deployment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub stack: String,
    pub environment: Environment,
    pub template: Template,
    /// Named outputs with their resolved values
    pub outputs: BTreeMap<String, String>,
    pub statements: Vec<PolicyStatement>,
    pub routes: Vec<RouteEntry>,
    /// Declarations in materialization order
    pub resources: Vec<MaterializedResource>,
}

impl Artifact {
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DeployError::Synthesis(format!("failed to serialize artifact: {}", e)))
    }

    /// Template logical id of declaration `id`
    pub fn logical_id(&self, id: &str) -> Option<&str> {
        self.resources
            .iter()
            .find(|r| r.declaration.id == id)
            .map(|r| r.logical_id.as_str())
    }

    /// Template resource emitted for declaration `id`
    pub fn resource(&self, id: &str) -> Option<&TemplateResource> {
        self.template.resource(self.logical_id(id)?)
    }

    /// Generated companion of declaration `id`, e.g. `Role` or `Stage`
    pub fn companion(&self, id: &str, suffix: &str) -> Option<&TemplateResource> {
        let logical = format!("{}{}", self.logical_id(id)?, suffix);
        self.template.resource(&logical)
    }

    /// Method resource bound to `method` on `path` of `gateway`
    pub fn method(&self, gateway: &str, path: &str, method: HttpMethod) -> Option<&TemplateResource> {
        let path = path.parse().ok()?;
        self.template
            .resource(&naming::method_logical_id(gateway, &path, method))
    }

    pub fn statements_for(&self, principal: &str) -> impl Iterator<Item = &PolicyStatement> + '_ {
        let principal = principal.to_string();
        self.statements
            .iter()
            .filter(move |s| s.principal == principal)
    }
}

/// Synthesize the deployment artifact
///
/// Runs the cycle check, materializes declarations producers first, then
/// emits permission statements, the route table, named outputs and the
/// template. The first failing phase aborts synthesis.
pub fn synthesize(descriptor: &Descriptor) -> Result<Artifact> {
    let stack = descriptor.name();
    let env = descriptor.environment();
    tracing::info!(stack, account = %env.account, region = %env.region, "synthesizing");

    let materialized = resolve::materialize(descriptor)?;
    tracing::info!(resources = materialized.len(), "materialized declarations");

    let statements = grant::emit_statements(descriptor.grants(), &materialized)?;
    tracing::info!(statements = statements.len(), "emitted policy statements");

    let routes = route::route_table(descriptor.routes(), &materialized)?;
    tracing::info!(routes = routes.len(), "emitted route table");

    let mut outputs = BTreeMap::new();
    let mut template_outputs = BTreeMap::new();
    for (name, output) in descriptor.outputs() {
        let value = materialized.resolve_ref(&format!("output {}", name), &output.value)?;
        template_outputs.insert(name.clone(), (value.clone(), output.description.clone()));
        outputs.insert(name.clone(), value);
    }

    let template = emit::build_template(
        stack,
        &env.region,
        &materialized,
        &statements,
        &routes,
        &template_outputs,
    )?;
    tracing::info!(template_resources = template.resources.len(), "built template");

    Ok(Artifact {
        stack: stack.to_string(),
        environment: env.clone(),
        template,
        outputs,
        statements,
        routes,
        resources: materialized.iter().cloned().collect(),
    })
}
