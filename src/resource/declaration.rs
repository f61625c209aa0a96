//! Resource declarations
//!
//! A declaration is a named, typed option record. Options are validated
//! against the kind schema from the registry; defaults are filled in so a
//! stored declaration is always complete.

use super::kind::ResourceKind;
use super::registry::{schema, OptionDef, OptionType};
use super::value::{AttributeRef, ConfigValue, Options};
use crate::error::{DeployError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Longest accepted declaration id
const MAX_ID_LEN: usize = 64;

/// Environment variable injected by the Function `table` option
pub const TABLE_NAME_ENV: &str = "TABLE_NAME";

/// A named, typed configuration record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDeclaration {
    pub id: String,
    pub kind: ResourceKind,
    pub config: Options,
    /// Populated by materialization; empty on authored declarations
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub generated_attributes: BTreeMap<String, String>,
}

impl ResourceDeclaration {
    /// Validate `config` against the kind schema and build a declaration
    pub fn declare(id: &str, kind: ResourceKind, config: Options) -> Result<Self> {
        validate_id(id)?;
        if !schema(kind).declarable {
            return Err(DeployError::validation(
                id,
                format!("kind '{}' is created by route bindings and cannot be declared", kind),
            ));
        }
        Self::build(id, kind, config)
    }

    /// Build a declaration without the declarable/id checks (route binder paths)
    pub(crate) fn build(id: &str, kind: ResourceKind, mut config: Options) -> Result<Self> {
        let kind_schema = schema(kind);

        for (name, value) in &config {
            let Some(def) = kind_schema.options.get(name) else {
                let known: Vec<&str> = kind_schema.options.keys().map(|s| s.as_str()).collect();
                return Err(DeployError::validation(
                    id,
                    format!(
                        "unrecognized option '{}' for kind '{}' (expected one of: {})",
                        name,
                        kind,
                        known.join(", ")
                    ),
                ));
            };
            check_option(id, name, def, value)?;
        }

        for (name, def) in &kind_schema.options {
            if config.contains_key(name) {
                continue;
            }
            if def.required {
                return Err(DeployError::validation(
                    id,
                    format!("missing required option '{}'", name),
                ));
            }
            if let Some(default) = &def.default {
                config.insert(name.clone(), default.clone());
            }
        }

        check_kind_rules(id, kind, &config)?;

        Ok(Self {
            id: id.to_string(),
            kind,
            config,
            generated_attributes: BTreeMap::new(),
        })
    }

    pub fn get(&self, option: &str) -> Option<&ConfigValue> {
        self.config.get(option)
    }

    pub fn str_opt(&self, option: &str) -> Option<&str> {
        self.get(option).and_then(|v| v.as_str())
    }

    /// Boolean option (defaults are filled at declaration, absent means false)
    pub fn bool_opt(&self, option: &str) -> bool {
        self.get(option).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub fn int_opt(&self, option: &str) -> Option<i64> {
        self.get(option).and_then(|v| v.as_int())
    }

    pub fn ref_opt(&self, option: &str) -> Option<&AttributeRef> {
        self.get(option).and_then(|v| v.as_reference())
    }

    pub fn list_opt(&self, option: &str) -> Vec<&str> {
        self.get(option)
            .and_then(|v| v.as_list())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Every reference this declaration consumes, with the option it sits in
    pub fn references(&self) -> Vec<(&str, &AttributeRef)> {
        self.config
            .iter()
            .flat_map(|(name, value)| {
                value
                    .references()
                    .into_iter()
                    .map(move |r| (name.as_str(), r))
            })
            .collect()
    }

    /// Generated attribute (only after materialization)
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.generated_attributes.get(name).map(|s| s.as_str())
    }
}

/// Validate a declaration id: ASCII letter first, then letters, digits, `-` or `_`
pub fn validate_id(id: &str) -> Result<()> {
    let mut chars = id.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if !starts_ok || !rest_ok || id.len() > MAX_ID_LEN {
        return Err(DeployError::validation(
            id,
            format!(
                "id must start with a letter, contain only letters, digits, '-' or '_', and be at most {} characters",
                MAX_ID_LEN
            ),
        ));
    }
    Ok(())
}

fn type_mismatch(id: &str, name: &str, def: &OptionDef, value: &ConfigValue) -> DeployError {
    DeployError::validation(
        id,
        format!(
            "option '{}' expects a {}, got a {}",
            name,
            def.option_type.as_str(),
            value.type_name()
        ),
    )
}

fn check_option(id: &str, name: &str, def: &OptionDef, value: &ConfigValue) -> Result<()> {
    match def.option_type {
        OptionType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
            if s.is_empty() {
                return Err(DeployError::validation(
                    id,
                    format!("option '{}' must not be empty", name),
                ));
            }
            if let Some(format) = def.name_format {
                format.check(s).map_err(|rule| {
                    DeployError::validation(id, format!("option '{}' value '{}' {}", name, s, rule))
                })?;
            }
        }
        OptionType::Bool => {
            value
                .as_bool()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
        }
        OptionType::Int => {
            let i = value
                .as_int()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
            if let Some(min) = def.min.filter(|min| i < *min) {
                return Err(DeployError::validation(
                    id,
                    format!("option '{}' must be >= {}, got {}", name, min, i),
                ));
            }
            if let Some(max) = def.max.filter(|max| i > *max) {
                return Err(DeployError::validation(
                    id,
                    format!("option '{}' must be <= {}, got {}", name, max, i),
                ));
            }
            if !def.one_of.is_empty() && !def.one_of.contains(&i) {
                return Err(DeployError::validation(
                    id,
                    format!("option '{}' does not allow {}", name, i),
                ));
            }
        }
        OptionType::Enum => {
            let s = value
                .as_str()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
            if !def.values.iter().any(|v| v == s) {
                return Err(DeployError::validation(
                    id,
                    format!(
                        "option '{}' must be one of [{}], got '{}'",
                        name,
                        def.values.join(", "),
                        s
                    ),
                ));
            }
        }
        OptionType::StringList => {
            let items = value
                .as_list()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
            if items.iter().any(|v| v.as_str().is_none()) {
                return Err(DeployError::validation(
                    id,
                    format!("option '{}' must only contain strings", name),
                ));
            }
        }
        OptionType::StringMap => {
            let map = value
                .as_map()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
            for (key, entry) in map {
                if entry.as_str().is_none() && entry.as_reference().is_none() {
                    return Err(DeployError::validation(
                        id,
                        format!(
                            "option '{}' entry '{}' must be a string or reference, got a {}",
                            name,
                            key,
                            entry.type_name()
                        ),
                    ));
                }
            }
        }
        OptionType::Ref => {
            let reference = value
                .as_reference()
                .ok_or_else(|| type_mismatch(id, name, def, value))?;
            if !def.target_attributes.is_empty()
                && !def.target_attributes.contains(&reference.attribute)
            {
                return Err(DeployError::validation(
                    id,
                    format!(
                        "option '{}' must reference one of [{}], got '{}'",
                        name,
                        def.target_attributes.join(", "),
                        reference.attribute
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Cross-option rules that the per-option schema cannot express
fn check_kind_rules(id: &str, kind: ResourceKind, config: &Options) -> Result<()> {
    let has = |name: &str| config.contains_key(name);
    let str_of = |name: &str| config.get(name).and_then(|v| v.as_str());
    let bool_of = |name: &str| config.get(name).and_then(|v| v.as_bool()).unwrap_or(false);

    match kind {
        ResourceKind::Storage => {
            if bool_of("autoDeleteObjects") && str_of("retention") != Some("DESTROY") {
                return Err(DeployError::validation(
                    id,
                    "option 'autoDeleteObjects' requires retention 'DESTROY'",
                ));
            }
        }
        ResourceKind::Table => {
            if has("sortKeyName") != has("sortKeyType") {
                return Err(DeployError::validation(
                    id,
                    "options 'sortKeyName' and 'sortKeyType' must be given together",
                ));
            }
            let provisioned = str_of("billingMode") == Some("PROVISIONED");
            for capacity in ["readCapacity", "writeCapacity"] {
                if provisioned && !has(capacity) {
                    return Err(DeployError::validation(
                        id,
                        format!("missing required option '{}' for billing mode PROVISIONED", capacity),
                    ));
                }
                if !provisioned && has(capacity) {
                    return Err(DeployError::validation(
                        id,
                        format!("option '{}' is only valid with billing mode PROVISIONED", capacity),
                    ));
                }
            }
        }
        ResourceKind::Function => {
            let env_has_table = config
                .get("envVars")
                .and_then(|v| v.as_map())
                .is_some_and(|env| env.contains_key(TABLE_NAME_ENV));
            if has("table") && env_has_table {
                return Err(DeployError::validation(
                    id,
                    format!(
                        "env var '{}' is set by the 'table' option and cannot also be authored",
                        TABLE_NAME_ENV
                    ),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::options;

    fn table_config() -> Options {
        options([
            ("partitionKeyName", "id".into()),
            ("partitionKeyType", "STRING".into()),
        ])
    }

    #[test]
    fn test_declare_fills_defaults() {
        let decl = ResourceDeclaration::declare("items-table", ResourceKind::Table, table_config())
            .unwrap();
        assert_eq!(decl.str_opt("billingMode"), Some("PAY_PER_REQUEST"));
        assert!(!decl.bool_opt("pointInTimeRecovery"));
        assert!(decl.generated_attributes.is_empty());
    }

    #[test]
    fn test_missing_partition_key_type_names_option() {
        let mut config = table_config();
        config.remove("partitionKeyType");
        let err = ResourceDeclaration::declare("items-table", ResourceKind::Table, config)
            .unwrap_err();
        match err {
            DeployError::Validation { id, constraint } => {
                assert_eq!(id, "items-table");
                assert!(constraint.contains("partitionKeyType"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_enum_out_of_range() {
        let mut config = table_config();
        config.insert("partitionKeyType".into(), "UUID".into());
        let err = ResourceDeclaration::declare("t", ResourceKind::Table, config).unwrap_err();
        assert!(err.to_string().contains("STRING, NUMBER, BINARY"));
    }

    #[test]
    fn test_unrecognized_option() {
        let mut config = table_config();
        config.insert("shards".into(), ConfigValue::Int(3));
        let err = ResourceDeclaration::declare("t", ResourceKind::Table, config).unwrap_err();
        assert!(err.to_string().contains("unrecognized option 'shards'"));
    }

    #[test]
    fn test_function_timeout_must_be_positive() {
        let config = options([
            ("runtimeId", "nodejs20.x".into()),
            ("handlerEntry", "index.handler".into()),
            ("codeLocation", "lambda/".into()),
            ("timeoutSeconds", ConfigValue::Int(0)),
        ]);
        let err = ResourceDeclaration::declare("fn", ResourceKind::Function, config).unwrap_err();
        assert!(err.to_string().contains("'timeoutSeconds' must be >= 1"));
    }

    #[test]
    fn test_type_mismatch() {
        let config = options([("publicAccess", "yes".into())]);
        let err = ResourceDeclaration::declare("b", ResourceKind::Storage, config).unwrap_err();
        assert!(err.to_string().contains("expects a bool, got a string"));
    }

    #[test]
    fn test_cdn_origin_must_be_a_bucket_domain() {
        let origin = |attribute: &str| {
            options([("origin", AttributeRef::new("site-bucket", attribute).into())])
        };
        let err = ResourceDeclaration::declare("cdn", ResourceKind::Cdn, origin("arn")).unwrap_err();
        match err {
            DeployError::Validation { id, constraint } => {
                assert_eq!(id, "cdn");
                assert!(constraint.contains("regionalDomainName"), "{constraint}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ResourceDeclaration::declare("cdn", ResourceKind::Cdn, origin("bucketName")).is_err());
        assert!(ResourceDeclaration::declare("cdn", ResourceKind::Cdn, origin("domainName")).is_ok());
        assert!(
            ResourceDeclaration::declare("cdn", ResourceKind::Cdn, origin("regionalDomainName")).is_ok()
        );
    }

    #[test]
    fn test_explicit_names_follow_provider_rules() {
        let bucket = |name: &str| options([("bucketName", name.into())]);
        assert!(ResourceDeclaration::declare("b", ResourceKind::Storage, bucket("site-assets")).is_ok());
        let err =
            ResourceDeclaration::declare("b", ResourceKind::Storage, bucket("My_Bucket")).unwrap_err();
        assert!(err.to_string().contains("bucketName"), "{err}");

        let function = |name: String| {
            options([
                ("runtimeId", "nodejs20.x".into()),
                ("handlerEntry", "index.handler".into()),
                ("codeLocation", "lambda/".into()),
                ("functionName", name.into()),
            ])
        };
        assert!(ResourceDeclaration::declare("f", ResourceKind::Function, function("items".into())).is_ok());
        assert!(
            ResourceDeclaration::declare("f", ResourceKind::Function, function("f".repeat(200))).is_err()
        );

        let mut config = table_config();
        config.insert("tableName".into(), "orders table".into());
        assert!(ResourceDeclaration::declare("t", ResourceKind::Table, config).is_err());

        let stage = options([("stageName", "prod/v2".into())]);
        assert!(ResourceDeclaration::declare("api", ResourceKind::ApiGateway, stage).is_err());
    }

    #[test]
    fn test_sort_key_pairing() {
        let mut config = table_config();
        config.insert("sortKeyName".into(), "createdAt".into());
        assert!(ResourceDeclaration::declare("t", ResourceKind::Table, config).is_err());
    }

    #[test]
    fn test_provisioned_requires_capacity() {
        let mut config = table_config();
        config.insert("billingMode".into(), "PROVISIONED".into());
        config.insert("readCapacity".into(), ConfigValue::Int(5));
        let err = ResourceDeclaration::declare("t", ResourceKind::Table, config).unwrap_err();
        assert!(err.to_string().contains("writeCapacity"));
    }

    #[test]
    fn test_auto_delete_requires_destroy() {
        let config = options([("autoDeleteObjects", true.into())]);
        assert!(ResourceDeclaration::declare("b", ResourceKind::Storage, config).is_err());

        let config = options([
            ("autoDeleteObjects", true.into()),
            ("retention", "DESTROY".into()),
        ]);
        assert!(ResourceDeclaration::declare("b", ResourceKind::Storage, config).is_ok());
    }

    #[test]
    fn test_table_option_conflicts_with_authored_env() {
        let mut env = BTreeMap::new();
        env.insert(TABLE_NAME_ENV.to_string(), ConfigValue::from("manual"));
        let config = options([
            ("runtimeId", "nodejs20.x".into()),
            ("handlerEntry", "index.handler".into()),
            ("codeLocation", "lambda/".into()),
            ("envVars", ConfigValue::Map(env)),
            ("table", AttributeRef::new("items-table", "tableName").into()),
        ]);
        let err = ResourceDeclaration::declare("fn", ResourceKind::Function, config).unwrap_err();
        assert!(err.to_string().contains(TABLE_NAME_ENV));
    }

    #[test]
    fn test_resource_path_not_declarable() {
        let err = ResourceDeclaration::declare("p", ResourceKind::ResourcePath, Options::new())
            .unwrap_err();
        assert!(err.to_string().contains("route bindings"));
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("site-bucket").is_ok());
        assert!(validate_id("fn_1").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("1bucket").is_err());
        assert!(validate_id("api/items").is_err());
    }
}
