//! Generated identifiers
//!
//! Everything the provider would normally assign (physical names, ids,
//! domains, ARNs) is derived from `(account, region, stack, id)` with
//! UUIDv5, so an unchanged descriptor always materializes identically.

use crate::descriptor::Environment;
use crate::error::{DeployError, Result};
use crate::resolve::Materialized;
use crate::resource::{ResourceDeclaration, ResourceKind};
use crate::route::{self, HttpMethod, RoutePath};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;
use uuid::Uuid;

/// Bucket names are capped at 63 characters
const MAX_BUCKET_NAME: usize = 63;
/// Function and role names are capped at 64 characters
const MAX_FUNCTION_NAME: usize = 64;

/// Stack-wide inputs to identifier generation
#[derive(Debug, Clone)]
pub struct NamingContext {
    pub stack: String,
    pub account: String,
    pub region: String,
}

impl NamingContext {
    pub fn new(stack: &str, env: &Environment) -> Self {
        Self {
            stack: stack.to_string(),
            account: env.account.clone(),
            region: env.region.clone(),
        }
    }

    /// Stable 32-char hex digest for `(id, salt)`
    fn digest(&self, id: &str, salt: &str) -> String {
        let key = format!(
            "sitestack://{}/{}/{}/{}#{}",
            self.account, self.region, self.stack, id, salt
        );
        Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
            .simple()
            .to_string()
    }

    /// `{stack}-{id}-{suffix}`, lowercased and cut to `max` characters
    fn physical(&self, id: &str, max: usize) -> String {
        let suffix = &self.digest(id, "name")[..8];
        let base: String = format!("{}-{}", self.stack, id)
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let keep = max.saturating_sub(suffix.len() + 1);
        let base = base[..base.len().min(keep)].trim_end_matches('-');
        format!("{}-{}", base, suffix)
    }

    fn api_url(&self, rest_api_id: &str, stage: &str) -> Result<String> {
        let mut url = Url::parse(&format!(
            "https://{}.execute-api.{}.amazonaws.com/",
            rest_api_id, self.region
        ))
        .map_err(|e| DeployError::Synthesis(format!("invalid endpoint for '{}': {}", rest_api_id, e)))?;
        url.path_segments_mut()
            .map_err(|_| DeployError::Synthesis(format!("endpoint for '{}' cannot carry a path", rest_api_id)))?
            .clear()
            .push(stage)
            .push("");
        Ok(url.to_string())
    }
}

fn explicit<'a>(resolved: &'a Map<String, Value>, option: &str) -> Option<&'a str> {
    resolved.get(option).and_then(|v| v.as_str())
}

/// Attributes the provider would assign to `decl`
pub fn generate_attributes(
    ctx: &NamingContext,
    decl: &ResourceDeclaration,
    resolved: &Map<String, Value>,
    materialized: &Materialized,
) -> Result<BTreeMap<String, String>> {
    let id = decl.id.as_str();
    let mut attrs = BTreeMap::new();
    let mut set = |k: &str, v: String| {
        attrs.insert(k.to_string(), v);
    };

    match decl.kind {
        ResourceKind::Storage => {
            let name = explicit(resolved, "bucketName")
                .map(str::to_string)
                .unwrap_or_else(|| ctx.physical(id, MAX_BUCKET_NAME));
            set("arn", format!("arn:aws:s3:::{}", name));
            set("domainName", format!("{}.s3.amazonaws.com", name));
            set(
                "regionalDomainName",
                format!("{}.s3.{}.amazonaws.com", name, ctx.region),
            );
            set("bucketName", name);
        }
        ResourceKind::Cdn => {
            let digest = ctx.digest(id, "distribution");
            let distribution_id = format!("E{}", digest[..13].to_ascii_uppercase());
            set("domainName", format!("d{}.cloudfront.net", &digest[13..26]));
            set(
                "arn",
                format!("arn:aws:cloudfront::{}:distribution/{}", ctx.account, distribution_id),
            );
            set("distributionId", distribution_id);
        }
        ResourceKind::Table => {
            let name = explicit(resolved, "tableName")
                .map(str::to_string)
                .unwrap_or_else(|| ctx.physical(id, 255));
            set(
                "arn",
                format!("arn:aws:dynamodb:{}:{}:table/{}", ctx.region, ctx.account, name),
            );
            set("tableName", name);
        }
        ResourceKind::LogGroup => {
            let name = explicit(resolved, "logGroupName")
                .map(str::to_string)
                .unwrap_or_else(|| format!("/sitestack/{}/{}", ctx.stack, id));
            set(
                "arn",
                format!("arn:aws:logs:{}:{}:log-group:{}", ctx.region, ctx.account, name),
            );
            set("logGroupName", name);
        }
        ResourceKind::Function => {
            let name = explicit(resolved, "functionName")
                .map(str::to_string)
                .unwrap_or_else(|| ctx.physical(id, MAX_FUNCTION_NAME));
            let role = ctx.physical(&format!("{}-role", id), MAX_FUNCTION_NAME);
            set(
                "arn",
                format!("arn:aws:lambda:{}:{}:function:{}", ctx.region, ctx.account, name),
            );
            set("roleArn", format!("arn:aws:iam::{}:role/{}", ctx.account, role));
            set("roleName", role);
            set("functionName", name);
        }
        ResourceKind::ApiGateway => {
            let rest_api_id = ctx.digest(id, "rest-api")[..10].to_string();
            let stage = explicit(resolved, "stageName").unwrap_or("prod");
            set("url", ctx.api_url(&rest_api_id, stage)?);
            set(
                "executeArn",
                format!("arn:aws:execute-api:{}:{}:{}", ctx.region, ctx.account, rest_api_id),
            );
            set("rootResourceId", ctx.digest(id, "root")[..10].to_string());
            set("restApiId", rest_api_id);
        }
        ResourceKind::ResourcePath => {
            let part = explicit(resolved, "pathPart").unwrap_or_default();
            let parent_path = decl
                .ref_opt("parent")
                .and_then(|r| materialized.attribute(&r.target, "path"))
                .unwrap_or("");
            set("path", format!("{}/{}", parent_path, part));
            set("resourceId", ctx.digest(id, "resource")[..6].to_string());
        }
    }

    Ok(attrs)
}

/// Provider-visible name that must be unique per kind
pub fn physical_name(kind: ResourceKind, attrs: &BTreeMap<String, String>) -> Option<&str> {
    let key = match kind {
        ResourceKind::Storage => "bucketName",
        ResourceKind::Table => "tableName",
        ResourceKind::LogGroup => "logGroupName",
        ResourceKind::Function => "functionName",
        ResourceKind::Cdn | ResourceKind::ApiGateway | ResourceKind::ResourcePath => return None,
    };
    attrs.get(key).map(|s| s.as_str())
}

/// Length of the digest suffix on logical ids
const LOGICAL_ID_DIGEST: usize = 8;

/// Template logical id: PascalCase of the declaration id plus a digest
///
/// `items-api/items/{id}` becomes `ItemsApiItemsId` followed by eight
/// uppercase hex digits of the UUIDv5 of the full id. The readable part is
/// lossy (`/items-x` and `/items/x` share it); the digest keeps distinct ids
/// apart. Generated companions append a suffix (`Role`, `Stage`, `Get`) to
/// this id. A logical id always ends in `[0-9A-F]` and no suffix does, so a
/// suffixed id can't equal another declaration's logical id.
pub fn logical_id(id: &str) -> String {
    let readable: String = id
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    let digest = Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
        .simple()
        .to_string()
        .to_ascii_uppercase();
    format!("{}{}", readable, &digest[..LOGICAL_ID_DIGEST])
}

/// Logical id of the method resource for `method` on `path` of `gateway`
pub fn method_logical_id(gateway: &str, path: &RoutePath, method: HttpMethod) -> String {
    let resource = if path.is_root() {
        format!("{}Root", logical_id(gateway))
    } else {
        logical_id(&route::path_declaration_id(gateway, path))
    };
    format!("{}{}", resource, method.logical_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> NamingContext {
        NamingContext::new("demo", &Environment::new("123456789012", "eu-west-1"))
    }

    #[test]
    fn test_logical_id() {
        let id = logical_id("site-bucket");
        assert!(id.starts_with("SiteBucket"));
        assert_eq!(id.len(), "SiteBucket".len() + LOGICAL_ID_DIGEST);
        assert!(id["SiteBucket".len()..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_eq!(id, logical_id("site-bucket"));
        assert!(logical_id("items-api/items/{id}").starts_with("ItemsApiItemsId"));
        assert!(logical_id("fn_v2").starts_with("FnV2"));
    }

    #[test]
    fn test_logical_id_separates_lossy_ids() {
        let pairs = [
            ("api/items-x", "api/items/x"),
            ("api/items/{id}", "api/items/id"),
            ("api/Items", "api/items"),
            ("site-bucket", "site_bucket"),
            ("a-1", "a1"),
        ];
        for (a, b) in pairs {
            assert_ne!(logical_id(a), logical_id(b), "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_suffixed_ids_stay_out_of_declaration_space() {
        // a gateway's deployment vs a declaration named after it
        let deployment = format!("{}Deployment", logical_id("api"));
        assert_ne!(deployment, logical_id("api-deployment"));
        assert_ne!(deployment, logical_id("api/deployment"));
        let root_get = format!("{}RootGet", logical_id("api"));
        assert_ne!(root_get, format!("{}Get", logical_id("api/root")));
    }

    #[test]
    fn test_physical_names_are_stable_and_bounded() {
        let a = ctx().physical("site-bucket", MAX_BUCKET_NAME);
        let b = ctx().physical("site-bucket", MAX_BUCKET_NAME);
        assert_eq!(a, b);
        assert!(a.starts_with("demo-site-bucket-"));

        let long = ctx().physical(&"x".repeat(100), MAX_BUCKET_NAME);
        assert!(long.len() <= MAX_BUCKET_NAME);
    }

    #[test]
    fn test_digest_depends_on_environment() {
        let other = NamingContext::new("demo", &Environment::new("123456789012", "us-east-1"));
        assert_ne!(ctx().digest("x", "name"), other.digest("x", "name"));
    }

    #[test]
    fn test_api_url() {
        let url = ctx().api_url("abc123defg", "prod").unwrap();
        assert_eq!(url, "https://abc123defg.execute-api.eu-west-1.amazonaws.com/prod/");
    }
}
