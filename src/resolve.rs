//! Reference resolution
//!
//! Declarations consume generated attributes of other declarations through
//! [`AttributeRef`] values in their options. Those references form a graph
//! that must be acyclic; declarations are materialized producers first, so a
//! consumer's options are finalized only once every referenced attribute
//! exists.
//!
//! Ordering uses Kahn's algorithm. Among declarations that are ready at the
//! same time, program order wins, which keeps synthesis deterministic.

use crate::descriptor::Descriptor;
use crate::error::{DeployError, Result};
use crate::resource::{schema, AttributeRef, OptionType, ResourceDeclaration};
use crate::synth::naming::{self, NamingContext};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `from` consumes `attribute` of `to` through option `option`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ReferenceEdge {
    pub from: String,
    pub to: String,
    pub attribute: String,
    pub option: String,
}

/// Every reference edge in the descriptor, in program order
pub fn reference_edges(descriptor: &Descriptor) -> Vec<ReferenceEdge> {
    descriptor
        .declarations()
        .iter()
        .flat_map(|decl| {
            decl.references()
                .into_iter()
                .map(|(option, r)| ReferenceEdge {
                    from: decl.id.clone(),
                    to: r.target.clone(),
                    attribute: r.attribute.clone(),
                    option: option.to_string(),
                })
        })
        .collect()
}

/// Reject dangling references, wrong target kinds and unknown attributes
fn check_edge(descriptor: &Descriptor, edge: &ReferenceEdge) -> Result<()> {
    let Some(from) = descriptor.get(&edge.from) else {
        return Err(DeployError::unresolved(&edge.from, &edge.to, "consumer is not declared"));
    };
    let Some(to) = descriptor.get(&edge.to) else {
        return Err(DeployError::unresolved(
            &edge.from,
            &edge.to,
            format!("option '{}' references an undeclared resource", edge.option),
        ));
    };

    if let Some(def) = schema(from.kind).options.get(&edge.option) {
        if def.option_type == OptionType::Ref
            && !def.target_kinds.is_empty()
            && !def.target_kinds.contains(&to.kind)
        {
            let allowed: Vec<&str> = def.target_kinds.iter().map(|k| k.as_str()).collect();
            return Err(DeployError::validation(
                &edge.from,
                format!(
                    "option '{}' must reference one of [{}], but '{}' is a {}",
                    edge.option,
                    allowed.join(", "),
                    edge.to,
                    to.kind
                ),
            ));
        }
    }

    if !schema(to.kind).has_attribute(&edge.attribute) {
        return Err(DeployError::unresolved(
            &edge.from,
            &edge.to,
            format!("{} has no attribute '{}'", to.kind, edge.attribute),
        ));
    }
    Ok(())
}

/// Declaration ids in materialization order
///
/// Fails with `UnresolvedReference` on dangling references or cycles; the
/// cycle check always terminates since every round either places a node or
/// stops.
pub fn resolution_order(descriptor: &Descriptor) -> Result<Vec<String>> {
    let edges = reference_edges(descriptor);
    for edge in &edges {
        check_edge(descriptor, edge)?;
    }

    let decls = descriptor.declarations();
    let position: HashMap<&str, usize> = decls
        .iter()
        .enumerate()
        .map(|(i, d)| (d.id.as_str(), i))
        .collect();

    // deps[i]: declarations i consumes; dependents[j]: declarations consuming j
    let mut deps: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); decls.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); decls.len()];
    for edge in &edges {
        let (from, to) = (position[edge.from.as_str()], position[edge.to.as_str()]);
        if deps[from].insert(to) {
            dependents[to].push(from);
        }
    }

    let mut remaining: Vec<usize> = deps.iter().map(|d| d.len()).collect();
    let mut ready: BTreeSet<usize> = (0..decls.len()).filter(|i| remaining[*i] == 0).collect();
    let mut order = Vec::with_capacity(decls.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for dependent in &dependents[next] {
            remaining[*dependent] -= 1;
            if remaining[*dependent] == 0 {
                ready.insert(*dependent);
            }
        }
    }

    if order.len() < decls.len() {
        let cycle = find_cycle(&deps, &remaining);
        let ids: Vec<&str> = cycle.iter().map(|i| decls[*i].id.as_str()).collect();
        let from = ids.first().copied().unwrap_or_default();
        let to = ids.get(1).copied().unwrap_or(from);
        return Err(DeployError::unresolved(
            from,
            to,
            format!("reference cycle detected: {}", ids.join(" -> ")),
        ));
    }

    tracing::debug!(declarations = order.len(), edges = edges.len(), "computed resolution order");

    Ok(order.into_iter().map(|i| decls[i].id.clone()).collect())
}

/// Walk unplaced nodes until one repeats; returns the cycle closed on its start
fn find_cycle(deps: &[BTreeSet<usize>], remaining: &[usize]) -> Vec<usize> {
    let Some(start) = (0..deps.len()).find(|i| remaining[*i] > 0) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut current = start;
    loop {
        // an unplaced node always has an unplaced dependency
        let Some(next) = deps[current].iter().copied().find(|d| remaining[*d] > 0) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|n| *n == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

/// A declaration after materialization
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedResource {
    #[serde(flatten)]
    pub declaration: ResourceDeclaration,
    /// Options with every reference replaced by its value
    pub resolved: Map<String, Value>,
    /// Template logical id
    pub logical_id: String,
}

/// Materialized declarations, in materialization order
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    order: Vec<String>,
    resources: BTreeMap<String, MaterializedResource>,
}

impl Materialized {
    pub fn get(&self, id: &str) -> Option<&MaterializedResource> {
        self.resources.get(id)
    }

    pub fn declaration(&self, id: &str) -> Option<&ResourceDeclaration> {
        self.get(id).map(|m| &m.declaration)
    }

    pub fn attribute(&self, id: &str, attribute: &str) -> Option<&str> {
        self.declaration(id)?.attribute(attribute)
    }

    pub fn logical_id(&self, id: &str) -> Option<&str> {
        self.get(id).map(|m| m.logical_id.as_str())
    }

    /// Materialized resources in materialization order
    pub fn iter(&self) -> impl Iterator<Item = &MaterializedResource> {
        self.order.iter().filter_map(|id| self.resources.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Value of a reference edge; `to` must already be materialized
    pub fn resolve(&self, edge: &ReferenceEdge) -> Result<String> {
        self.resolve_ref(&edge.from, &AttributeRef::new(&edge.to, &edge.attribute))
    }

    pub fn resolve_ref(&self, from: &str, reference: &AttributeRef) -> Result<String> {
        let Some(target) = self.declaration(&reference.target) else {
            return Err(DeployError::unresolved(
                from,
                &reference.target,
                "referenced resource is not materialized",
            ));
        };
        target
            .attribute(&reference.attribute)
            .map(str::to_string)
            .ok_or_else(|| {
                DeployError::unresolved(
                    from,
                    &reference.target,
                    format!("attribute '{}' was not generated", reference.attribute),
                )
            })
    }

    fn insert(&mut self, resource: MaterializedResource) {
        self.order.push(resource.declaration.id.clone());
        self.resources
            .insert(resource.declaration.id.clone(), resource);
    }
}

/// Materialize every declaration in resolution order
///
/// Physical names and template logical ids must be unique; a clash is a
/// provider-side conflict and fails with `Synthesis`.
pub fn materialize(descriptor: &Descriptor) -> Result<Materialized> {
    let order = resolution_order(descriptor)?;
    let ctx = NamingContext::new(descriptor.name(), descriptor.environment());

    let mut out = Materialized::default();
    let mut physical_names: HashMap<(crate::resource::ResourceKind, String), String> = HashMap::new();
    let mut logical_ids: HashMap<String, String> = HashMap::new();

    for id in order {
        let Some(decl) = descriptor.get(&id) else {
            return Err(DeployError::Synthesis(format!("'{}' vanished during resolution", id)));
        };

        let mut resolved = Map::new();
        for (name, value) in &decl.config {
            let value = value.resolve_with(&mut |r: &AttributeRef| out.resolve_ref(&decl.id, r))?;
            resolved.insert(name.clone(), value);
        }

        let attributes = naming::generate_attributes(&ctx, decl, &resolved, &out)?;

        if let Some(name) = naming::physical_name(decl.kind, &attributes) {
            if let Some(other) = physical_names.insert((decl.kind, name.to_string()), id.clone()) {
                return Err(DeployError::Synthesis(format!(
                    "'{}' and '{}' both materialize to {} name '{}'",
                    other, id, decl.kind, name
                )));
            }
        }

        let logical_id = naming::logical_id(&id);
        if let Some(other) = logical_ids.insert(logical_id.clone(), id.clone()) {
            return Err(DeployError::Synthesis(format!(
                "'{}' and '{}' map to the same logical id '{}'",
                other, id, logical_id
            )));
        }

        tracing::debug!(id = %id, kind = %decl.kind, logical_id = %logical_id, "materialized declaration");

        let mut declaration = decl.clone();
        declaration.generated_attributes = attributes;
        out.insert(MaterializedResource {
            declaration,
            resolved,
            logical_id,
        });
    }

    Ok(out)
}
