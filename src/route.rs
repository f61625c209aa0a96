//! Route binding
//!
//! Attaches HTTP methods on gateway paths to backing functions. Each path
//! prefix becomes a `resource-path` declaration chained to its parent, so
//! paths are materialized through the same reference graph as everything
//! else. Authorization is chosen per binding; there is no default.

use crate::error::{DeployError, Result};
use crate::resolve::Materialized;
use crate::resource::{AttributeRef, ConfigValue, Options, ResourceDeclaration, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// HTTP method of a route binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    /// Matches every method on the path
    Any,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "ANY",
        }
    }

    /// Suffix of the method resource's logical id
    pub fn logical_suffix(&self) -> &'static str {
        match self {
            Self::Get => "Get",
            Self::Post => "Post",
            Self::Put => "Put",
            Self::Delete => "Delete",
            Self::Patch => "Patch",
            Self::Head => "Head",
            Self::Options => "Options",
            Self::Any => "Any",
        }
    }

    /// Two methods on one path overlap when equal or when either is ANY
    pub fn overlaps(&self, other: &HttpMethod) -> bool {
        self == other || *self == Self::Any || *other == Self::Any
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-route authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Authorization {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "requireApiKey")]
    RequireApiKey,
    #[serde(rename = "requireIAM")]
    RequireIam,
    #[serde(rename = "requireCustomAuthorizer")]
    RequireCustomAuthorizer,
}

impl Authorization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::RequireApiKey => "requireApiKey",
            Self::RequireIam => "requireIAM",
            Self::RequireCustomAuthorizer => "requireCustomAuthorizer",
        }
    }

    /// Provider `AuthorizationType` for the method resource
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::None | Self::RequireApiKey => "NONE",
            Self::RequireIam => "AWS_IAM",
            Self::RequireCustomAuthorizer => "CUSTOM",
        }
    }
}

/// Ordered sequence of path segments; the empty sequence is the root `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutePath {
    segments: Vec<String>,
}

impl RoutePath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Every non-root prefix, shortest first (`/a/b` -> `/a`, `/a/b`)
    pub fn prefixes(&self) -> impl Iterator<Item = RoutePath> + '_ {
        (1..=self.segments.len()).map(|n| RoutePath {
            segments: self.segments[..n].to_vec(),
        })
    }

    pub fn parent(&self) -> Option<RoutePath> {
        if self.is_root() {
            return None;
        }
        Some(RoutePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

fn valid_segment(segment: &str) -> bool {
    if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        let name = inner.strip_suffix('+').unwrap_or(inner);
        return !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    }
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl FromStr for RoutePath {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        let Some(rest) = s.strip_prefix('/') else {
            return Err(DeployError::validation(s, "route path must start with '/'"));
        };
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = rest.split('/').map(String::from).collect();
        if let Some(bad) = segments.iter().find(|seg| !valid_segment(seg)) {
            return Err(DeployError::validation(
                s,
                format!("invalid route path segment '{}'", bad),
            ));
        }
        Ok(Self { segments })
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl Serialize for RoutePath {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoutePath {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Association of (path, method) with a handling function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteBinding {
    pub gateway: String,
    pub path: RoutePath,
    pub method: HttpMethod,
    pub handler: String,
    pub authorization: Authorization,
}

impl RouteBinding {
    pub fn new(
        gateway: &str,
        path: RoutePath,
        method: HttpMethod,
        handler: &str,
        authorization: Authorization,
    ) -> Self {
        Self {
            gateway: gateway.to_string(),
            path,
            method,
            handler: handler.to_string(),
            authorization,
        }
    }
}

/// Declaration id of the `resource-path` for `path` on `gateway`
///
/// The `/` cannot appear in authored ids, so these never collide with them.
pub fn path_declaration_id(gateway: &str, path: &RoutePath) -> String {
    format!("{}{}", gateway, path)
}

/// Reference to the API resource a path hangs off
pub fn parent_resource_ref(gateway: &str, path: &RoutePath) -> AttributeRef {
    match path.parent() {
        Some(parent) if !parent.is_root() => {
            AttributeRef::new(&path_declaration_id(gateway, &parent), "resourceId")
        }
        _ => AttributeRef::new(gateway, "rootResourceId"),
    }
}

/// Check a binding against the bindings already registered
///
/// `lookup` resolves declaration ids registered so far.
pub fn check_binding<'a, F>(existing: &[RouteBinding], binding: &RouteBinding, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<&'a ResourceDeclaration>,
{
    if existing
        .iter()
        .any(|b| {
            b.gateway == binding.gateway
                && b.path == binding.path
                && b.method.overlaps(&binding.method)
        })
    {
        return Err(DeployError::DuplicateRoute {
            path: binding.path.to_string(),
            method: binding.method.to_string(),
        });
    }

    match lookup(&binding.handler) {
        Some(decl) if decl.kind == ResourceKind::Function => {}
        Some(decl) => {
            return Err(DeployError::InvalidHandler {
                handler: binding.handler.clone(),
                reason: format!("expected a function, found {}", decl.kind),
            })
        }
        None => {
            return Err(DeployError::InvalidHandler {
                handler: binding.handler.clone(),
                reason: "no such declaration".to_string(),
            })
        }
    }

    match lookup(&binding.gateway) {
        Some(decl)
            if decl.kind == ResourceKind::ApiGateway
                && binding.authorization == Authorization::RequireCustomAuthorizer
                && decl.ref_opt("authorizer").is_none() =>
        {
            Err(DeployError::validation(
                &binding.gateway,
                format!(
                    "route {} {} requires a custom authorizer, but the gateway has no 'authorizer' option",
                    binding.method, binding.path
                ),
            ))
        }
        Some(decl) if decl.kind == ResourceKind::ApiGateway => Ok(()),
        Some(decl) => Err(DeployError::validation(
            &binding.gateway,
            format!(
                "route {} {} targets a {}, expected an api-gateway",
                binding.method, binding.path, decl.kind
            ),
        )),
        None => Err(DeployError::unresolved(
            format!("{} {}", binding.method, binding.path),
            &binding.gateway,
            "gateway is not declared",
        )),
    }
}

/// `resource-path` declarations a binding needs, shortest prefix first
pub fn path_declarations(gateway: &str, path: &RoutePath) -> Result<Vec<ResourceDeclaration>> {
    path.prefixes()
        .map(|prefix| {
            let id = path_declaration_id(gateway, &prefix);
            let mut config = Options::new();
            config.insert(
                "parent".to_string(),
                ConfigValue::Ref(parent_resource_ref(gateway, &prefix)),
            );
            config.insert(
                "restApi".to_string(),
                ConfigValue::Ref(AttributeRef::new(gateway, "restApiId")),
            );
            let part = prefix.segments().last().cloned().unwrap_or_default();
            config.insert("pathPart".to_string(), ConfigValue::Str(part));
            ResourceDeclaration::build(&id, ResourceKind::ResourcePath, config)
        })
        .collect()
}

/// Entry of the emitted route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub gateway: String,
    pub path: String,
    pub method: HttpMethod,
    pub handler: String,
    pub authorization: Authorization,
    /// Logical id of the invocation target shared by every route of this handler
    pub integration: String,
    /// API resource the method hangs off
    pub resource_id: String,
}

/// Build the route table, grouping methods of one handler onto one integration
pub fn route_table(bindings: &[RouteBinding], materialized: &Materialized) -> Result<Vec<RouteEntry>> {
    let mut entries = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let resource = if binding.path.is_root() {
            materialized.attribute(&binding.gateway, "rootResourceId")
        } else {
            materialized.attribute(&path_declaration_id(&binding.gateway, &binding.path), "resourceId")
        };
        let resource_id = resource.ok_or_else(|| {
            DeployError::unresolved(
                format!("{} {}", binding.method, binding.path),
                &binding.gateway,
                "route resource was never materialized",
            )
        })?;

        entries.push(RouteEntry {
            gateway: binding.gateway.clone(),
            path: binding.path.to_string(),
            method: binding.method,
            handler: binding.handler.clone(),
            authorization: binding.authorization,
            integration: integration_id(materialized, &binding.gateway, &binding.handler),
            resource_id: resource_id.to_string(),
        });
    }
    entries.sort_by(|a, b| (&a.gateway, &a.path, a.method).cmp(&(&b.gateway, &b.path, b.method)));
    Ok(entries)
}

/// Logical id of the shared (gateway, handler) invocation permission
pub fn integration_id(materialized: &Materialized, gateway: &str, handler: &str) -> String {
    format!(
        "{}{}Permission",
        materialized.logical_id(gateway).unwrap_or(gateway),
        materialized.logical_id(handler).unwrap_or(handler)
    )
}

/// Bound paths per gateway, for CORS preflight emission
pub fn paths_by_gateway(entries: &[RouteEntry]) -> BTreeMap<&str, Vec<(&str, &str)>> {
    let mut out: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for entry in entries {
        let paths = out.entry(entry.gateway.as_str()).or_default();
        if !paths.iter().any(|(p, _)| *p == entry.path) {
            paths.push((entry.path.as_str(), entry.resource_id.as_str()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::options;

    fn function(id: &str) -> ResourceDeclaration {
        ResourceDeclaration::declare(
            id,
            ResourceKind::Function,
            options([
                ("runtimeId", "nodejs20.x".into()),
                ("handlerEntry", "index.handler".into()),
                ("codeLocation", "lambda/".into()),
            ]),
        )
        .unwrap()
    }

    fn gateway() -> ResourceDeclaration {
        ResourceDeclaration::declare("api", ResourceKind::ApiGateway, Options::new()).unwrap()
    }

    fn binding(path: &str, method: HttpMethod, handler: &str) -> RouteBinding {
        RouteBinding::new("api", path.parse().unwrap(), method, handler, Authorization::RequireIam)
    }

    #[test]
    fn test_parse_paths() {
        let path: RoutePath = "/items/{id}".parse().unwrap();
        assert_eq!(path.segments(), ["items", "{id}"]);
        assert_eq!(path.to_string(), "/items/{id}");
        assert!("/".parse::<RoutePath>().unwrap().is_root());
        assert!("items".parse::<RoutePath>().is_err());
        assert!("/items//x".parse::<RoutePath>().is_err());
        assert!("/{}".parse::<RoutePath>().is_err());
        assert!("/{proxy+}".parse::<RoutePath>().is_ok());
    }

    #[test]
    fn test_prefixes_shortest_first() {
        let path: RoutePath = "/a/b/c".parse().unwrap();
        let prefixes: Vec<String> = path.prefixes().map(|p| p.to_string()).collect();
        assert_eq!(prefixes, vec!["/a", "/a/b", "/a/b/c"]);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let f = function("items-fn");
        let g = gateway();
        let lookup = |id: &str| match id {
            "items-fn" => Some(&f),
            "api" => Some(&g),
            _ => None,
        };
        let first = binding("/items", HttpMethod::Get, "items-fn");
        check_binding(&[], &first, lookup).unwrap();

        let err = check_binding(&[first.clone()], &first, lookup).unwrap_err();
        assert!(matches!(err, DeployError::DuplicateRoute { .. }));

        let any = binding("/items", HttpMethod::Any, "items-fn");
        assert!(check_binding(&[first.clone()], &any, lookup).is_err());

        let other_path = binding("/orders", HttpMethod::Get, "items-fn");
        assert!(check_binding(&[first], &other_path, lookup).is_ok());
    }

    #[test]
    fn test_same_route_on_two_gateways() {
        let f = function("health-fn");
        let api = gateway();
        let admin =
            ResourceDeclaration::declare("admin", ResourceKind::ApiGateway, Options::new()).unwrap();
        let lookup = |id: &str| match id {
            "health-fn" => Some(&f),
            "api" => Some(&api),
            "admin" => Some(&admin),
            _ => None,
        };
        let public = binding("/health", HttpMethod::Get, "health-fn");
        let mut internal = public.clone();
        internal.gateway = "admin".to_string();

        check_binding(&[], &public, lookup).unwrap();
        check_binding(&[public.clone()], &internal, lookup).unwrap();
        assert!(check_binding(&[public, internal.clone()], &internal, lookup).is_err());
    }

    #[test]
    fn test_handler_must_be_function() {
        let g = gateway();
        let lookup = |id: &str| if id == "api" { Some(&g) } else { None };

        let err = check_binding(&[], &binding("/items", HttpMethod::Get, "api"), lookup).unwrap_err();
        assert!(matches!(err, DeployError::InvalidHandler { .. }));

        let err = check_binding(&[], &binding("/items", HttpMethod::Get, "ghost"), lookup).unwrap_err();
        assert!(matches!(err, DeployError::InvalidHandler { .. }));
    }

    #[test]
    fn test_custom_authorizer_needs_gateway_authorizer() {
        let f = function("items-fn");
        let g = gateway();
        let lookup = |id: &str| match id {
            "items-fn" => Some(&f),
            "api" => Some(&g),
            _ => None,
        };
        let mut b = binding("/items", HttpMethod::Get, "items-fn");
        b.authorization = Authorization::RequireCustomAuthorizer;
        let err = check_binding(&[], &b, lookup).unwrap_err();
        assert!(matches!(err, DeployError::Validation { .. }));
    }

    #[test]
    fn test_path_declarations_chain_to_parent() {
        let decls = path_declarations("api", &"/items/{id}".parse().unwrap()).unwrap();
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].id, "api/items");
        assert_eq!(
            decls[0].ref_opt("parent"),
            Some(&AttributeRef::new("api", "rootResourceId"))
        );
        assert_eq!(decls[1].id, "api/items/{id}");
        assert_eq!(
            decls[1].ref_opt("parent"),
            Some(&AttributeRef::new("api/items", "resourceId"))
        );
        assert_eq!(decls[1].str_opt("pathPart"), Some("{id}"));
    }

    #[test]
    fn test_authorization_serde_names() {
        let auth: Authorization = serde_yaml::from_str("requireIAM").unwrap();
        assert_eq!(auth, Authorization::RequireIam);
        assert_eq!(auth.provider_type(), "AWS_IAM");
        assert!(serde_yaml::from_str::<Authorization>("open").is_err());
    }
}
