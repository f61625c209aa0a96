//! Deployment template document

use crate::error::{DeployError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const FORMAT_VERSION: &str = "2010-09-09";

/// One provider resource in the template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties")]
    pub properties: Value,
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(rename = "DeletionPolicy", skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
    #[serde(rename = "UpdateReplacePolicy", skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
}

impl TemplateResource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self.depends_on.sort();
        self.depends_on.dedup();
        self
    }

    /// Map a `retention` option (`RETAIN`/`DESTROY`) onto deletion policies
    pub fn retention(mut self, retention: Option<&str>) -> Self {
        let policy = match retention {
            Some("DESTROY") => "Delete",
            _ => "Retain",
        };
        self.deletion_policy = Some(policy.to_string());
        self.update_replace_policy = Some(policy.to_string());
        self
    }
}

/// Named template output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateOutput {
    #[serde(rename = "Description", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Value")]
    pub value: String,
}

/// Provider-consumable template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

impl Template {
    pub fn new(description: String) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description,
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Add a resource; logical ids must be unique
    pub fn add(&mut self, logical_id: &str, resource: TemplateResource) -> Result<()> {
        if self.resources.contains_key(logical_id) {
            return Err(DeployError::Synthesis(format!(
                "logical id '{}' is emitted twice",
                logical_id
            )));
        }
        self.resources.insert(logical_id.to_string(), resource);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&TemplateResource> {
        self.resources.get(logical_id)
    }

    /// Resources of a provider type, by logical id
    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a TemplateResource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
            .map(|(id, r)| (id.as_str(), r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_logical_id() {
        let mut template = Template::new("t".into());
        template
            .add("A", TemplateResource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        let err = template
            .add("A", TemplateResource::new("AWS::S3::Bucket", json!({})))
            .unwrap_err();
        assert!(matches!(err, DeployError::Synthesis(_)));
    }

    #[test]
    fn test_serialized_shape() {
        let mut template = Template::new("t".into());
        template
            .add(
                "Logs",
                TemplateResource::new("AWS::Logs::LogGroup", json!({"RetentionInDays": 7}))
                    .retention(Some("DESTROY")),
            )
            .unwrap();
        let value = serde_json::to_value(&template).unwrap();
        assert_eq!(value["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(value["Resources"]["Logs"]["DeletionPolicy"], "Delete");
        assert!(value["Resources"]["Logs"].get("DependsOn").is_none());
        assert!(value.get("Outputs").is_none());
    }
}
