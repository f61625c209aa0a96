//! Typed configuration values
//!
//! Option values are authored as plain YAML/JSON scalars, lists and maps.
//! A map of exactly `{ref, attribute}` is an [`AttributeRef`]: a value that
//! only exists once the referenced declaration has been materialized.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Declaration options, keyed by option name
pub type Options = BTreeMap<String, ConfigValue>;

/// Reference to a generated attribute of another declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeRef {
    #[serde(rename = "ref")]
    pub target: String,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(target: &str, attribute: &str) -> Self {
        Self {
            target: target.to_string(),
            attribute: attribute.to_string(),
        }
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target, self.attribute)
    }
}

/// A single option value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<ConfigValue>),
    Ref(AttributeRef),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&AttributeRef> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Ref(_) => "reference",
            Self::Map(_) => "map",
        }
    }

    /// Collect every attribute reference nested in this value
    pub fn references(&self) -> Vec<&AttributeRef> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a AttributeRef>) {
        match self {
            Self::Ref(r) => out.push(r),
            Self::List(items) => items.iter().for_each(|v| v.collect_references(out)),
            Self::Map(map) => map.values().for_each(|v| v.collect_references(out)),
            _ => {}
        }
    }

    /// Convert to plain JSON, replacing every reference with its resolved value
    pub fn resolve_with<F>(&self, resolve: &mut F) -> Result<Value>
    where
        F: FnMut(&AttributeRef) -> Result<String>,
    {
        Ok(match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::String(s.clone()),
            Self::Ref(r) => Value::String(resolve(r)?),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|v| v.resolve_with(resolve))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Self::Map(map) => {
                let mut out = serde_json::Map::new();
                for (key, value) in map {
                    out.insert(key.clone(), value.resolve_with(resolve)?);
                }
                Value::Object(out)
            }
        })
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<AttributeRef> for ConfigValue {
    fn from(r: AttributeRef) -> Self {
        Self::Ref(r)
    }
}

impl From<Vec<&str>> for ConfigValue {
    fn from(items: Vec<&str>) -> Self {
        Self::List(items.into_iter().map(ConfigValue::from).collect())
    }
}

/// Build [`Options`] from `(name, value)` pairs
///
/// ```
/// use sitestack::resource::{options, AttributeRef};
///
/// let opts = options([
///     ("origin", AttributeRef::new("site-bucket", "regionalDomainName").into()),
///     ("spaFallback", true.into()),
/// ]);
/// assert_eq!(opts.len(), 2);
/// ```
pub fn options<const N: usize>(pairs: [(&str, ConfigValue); N]) -> Options {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    #[test]
    fn test_untagged_parsing() {
        let opts: Options = serde_yaml::from_str(
            r#"
timeoutSeconds: 30
tracingEnabled: true
handlerEntry: index.handler
corsAllowOrigins: ["*"]
table: { ref: items-table, attribute: tableName }
envVars:
  STAGE: prod
  BUCKET: { ref: site-bucket, attribute: bucketName }
"#,
        )
        .unwrap();

        assert_eq!(opts["timeoutSeconds"], ConfigValue::Int(30));
        assert_eq!(opts["tracingEnabled"], ConfigValue::Bool(true));
        assert_eq!(opts["handlerEntry"].as_str(), Some("index.handler"));
        assert_eq!(
            opts["table"].as_reference(),
            Some(&AttributeRef::new("items-table", "tableName"))
        );
        let env = opts["envVars"].as_map().unwrap();
        assert!(env["BUCKET"].as_reference().is_some());
        assert_eq!(opts["envVars"].references().len(), 1);
    }

    #[test]
    fn test_map_with_extra_keys_is_not_a_reference() {
        let value: ConfigValue =
            serde_json::from_str(r#"{"ref": "a", "attribute": "b", "extra": "c"}"#).unwrap();
        assert!(value.as_map().is_some());
    }

    #[test]
    fn test_resolve_with_substitutes_references() {
        let value: ConfigValue =
            serde_json::from_str(r#"{"A": "x", "B": {"ref": "t", "attribute": "tableName"}}"#)
                .unwrap();
        let resolved = value
            .resolve_with(&mut |r: &AttributeRef| Ok(format!("<{}>", r)))
            .unwrap();
        assert_eq!(resolved["A"], "x");
        assert_eq!(resolved["B"], "<t.tableName>");
    }

    #[test]
    fn test_resolve_with_propagates_errors() {
        let value = ConfigValue::Ref(AttributeRef::new("missing", "arn"));
        let result = value.resolve_with(&mut |r: &AttributeRef| {
            Err(DeployError::unresolved("x", &r.target, "absent"))
        });
        assert!(matches!(
            result,
            Err(DeployError::UnresolvedReference { .. })
        ));
    }
}
