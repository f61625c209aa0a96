//! Kind Registry - Load resource kind schemas from JSON
//!
//! This module loads every resource kind schema from embedded JSON files
//! and provides lookup functions for validation, grants and synthesis.

use super::kind::ResourceKind;
use super::names::NameFormat;
use super::value::ConfigValue;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Embedded kind schema files (compiled into the binary)
const SCHEMA_FILES: &[&str] = &[
    include_str!("../resources/storage.json"),
    include_str!("../resources/delivery.json"),
    include_str!("../resources/data.json"),
    include_str!("../resources/compute.json"),
    include_str!("../resources/api.json"),
];

/// Value type accepted by an option
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    String,
    Bool,
    Int,
    Enum,
    StringList,
    /// Map of string to string-or-reference
    StringMap,
    /// Attribute reference to another declaration
    Ref,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Enum => "enum",
            Self::StringList => "string list",
            Self::StringMap => "string map",
            Self::Ref => "reference",
        }
    }
}

/// Option definition from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct OptionDef {
    #[serde(rename = "type")]
    pub option_type: OptionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<ConfigValue>,
    /// Allowed values for `enum` options
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    /// Exhaustive allowed values for `int` options
    #[serde(default)]
    pub one_of: Vec<i64>,
    /// Kinds a `ref` option may point at
    #[serde(default)]
    pub target_kinds: Vec<ResourceKind>,
    /// Attributes a `ref` option may consume; empty allows any
    #[serde(default)]
    pub target_attributes: Vec<String>,
    /// Provider naming rule for explicit physical names
    #[serde(default)]
    pub name_format: Option<NameFormat>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_declarable() -> bool {
    true
}

/// Kind schema from JSON
#[derive(Debug, Clone, Deserialize)]
pub struct KindSchema {
    pub display_name: String,
    pub provider_type: String,
    /// False for kinds that only the route binder creates
    #[serde(default = "default_declarable")]
    pub declarable: bool,
    /// Attributes generated at materialization
    pub attributes: Vec<String>,
    /// Abstract action -> provider actions
    #[serde(default)]
    pub actions: BTreeMap<String, Vec<String>>,
    pub options: BTreeMap<String, OptionDef>,
}

impl KindSchema {
    /// Check whether `attribute` is generated for this kind
    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    /// Abstract action vocabulary, sorted
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(|s| s.as_str()).collect()
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub kinds: HashMap<ResourceKind, KindSchema>,
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<SchemaConfig> = OnceLock::new();

/// Get the kind registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static SchemaConfig {
    REGISTRY.get_or_init(|| {
        let mut final_config = SchemaConfig {
            kinds: HashMap::new(),
        };

        for content in SCHEMA_FILES {
            let partial: SchemaConfig = serde_json::from_str(content)
                .unwrap_or_else(|e| panic!("Failed to parse embedded kind schema JSON: {}", e));
            final_config.kinds.extend(partial.kinds);
        }

        final_config
    })
}

/// Get the schema for a kind
///
/// Every [`ResourceKind`] has an embedded schema; the registry test enforces it.
pub fn schema(kind: ResourceKind) -> &'static KindSchema {
    get_registry()
        .kinds
        .get(&kind)
        .unwrap_or_else(|| panic!("No embedded schema for kind '{}'", kind))
}

/// Get all kinds in declaration-friendly order (for `sitestack kinds`)
pub fn all_kinds() -> Vec<(ResourceKind, &'static KindSchema)> {
    ResourceKind::ALL
        .iter()
        .map(|kind| (*kind, schema(*kind)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert!(!registry.kinds.is_empty(), "Registry should have kinds");
    }

    #[test]
    fn test_every_kind_has_schema() {
        for kind in ResourceKind::ALL {
            assert!(
                get_registry().kinds.contains_key(kind),
                "Missing schema for {}",
                kind
            );
        }
    }

    #[test]
    fn test_table_schema_requires_partition_key() {
        let table = schema(ResourceKind::Table);
        assert!(table.options["partitionKeyName"].required);
        assert!(table.options["partitionKeyType"].required);
        assert_eq!(
            table.options["partitionKeyType"].values,
            vec!["STRING", "NUMBER", "BINARY"]
        );
    }

    #[test]
    fn test_action_vocabularies() {
        assert_eq!(schema(ResourceKind::Table).action_names(), vec!["read", "write"]);
        assert_eq!(
            schema(ResourceKind::Storage).action_names(),
            vec!["list", "read", "write"]
        );
        assert!(schema(ResourceKind::Cdn).action_names().is_empty());
    }

    #[test]
    fn test_defaults_match_option_types() {
        for (kind, kind_schema) in all_kinds() {
            for (name, def) in &kind_schema.options {
                if let Some(default) = &def.default {
                    let ok = match def.option_type {
                        OptionType::Bool => default.as_bool().is_some(),
                        OptionType::Int => default.as_int().is_some(),
                        OptionType::String | OptionType::Enum => default.as_str().is_some(),
                        _ => true,
                    };
                    assert!(ok, "default of {}.{} has the wrong type", kind, name);
                }
            }
        }
    }

    #[test]
    fn test_resource_path_is_not_declarable() {
        assert!(!schema(ResourceKind::ResourcePath).declarable);
        assert!(schema(ResourceKind::Function).declarable);
    }
}
