//! CloudFormation-shaped template document

use crate::error::{Result, TransformError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const FORMAT_VERSION: &str = "2010-09-09";
/// Base name of the emitted artifact
pub const TEMPLATE_BASE_NAME: &str = "cloudformation_template";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Resources by logical id, in the order they were added
    #[serde(default)]
    pub resources: IndexMap<String, TemplateResource>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: None,
            resources: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Register a resource; logical ids are unique.
    pub fn add_resource(
        &mut self,
        logic_name: impl Into<String>,
        resource: TemplateResource,
    ) -> Result<()> {
        let logic_name = logic_name.into();
        if self.resources.contains_key(&logic_name) {
            return Err(TransformError::DuplicateResource(logic_name));
        }
        tracing::debug!("Adding {} ({})", logic_name, resource.resource_type);
        self.resources.insert(logic_name, resource);
        Ok(())
    }

    pub fn contains(&self, logic_name: &str) -> bool {
        self.resources.contains_key(logic_name)
    }

    pub fn get(&self, logic_name: &str) -> Option<&TemplateResource> {
        self.resources.get(logic_name)
    }

    pub fn get_mut(&mut self, logic_name: &str) -> Option<&mut TemplateResource> {
        self.resources.get_mut(logic_name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl TemplateResource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.properties.insert(key.to_string(), value.into());
    }

    /// Set `key` only when `value` is present.
    pub fn set_opt(&mut self, key: &str, value: Option<&Value>) {
        if let Some(value) = value {
            self.set(key, value.clone());
        }
    }

    /// Append to a list property, creating it when absent.
    pub fn push(&mut self, key: &str, value: Value) {
        let entry = self
            .properties
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![other.take(), value]),
        }
    }

    pub fn depends_on(&mut self, logic_name: impl Into<String>) {
        let logic_name = logic_name.into();
        if !self.depends_on.contains(&logic_name) {
            self.depends_on.push(logic_name);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn file_name(&self) -> String {
        let ext = match self {
            OutputFormat::Json => "json",
            OutputFormat::Yaml => "yaml",
        };
        format!("{}.{}", TEMPLATE_BASE_NAME, ext)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "yaml" | "yml" => Ok(OutputFormat::Yaml),
            other => Err(format!("unknown template format: {}", other)),
        }
    }
}

/// `{"Ref": logic_name}`
pub fn reference(logic_name: &str) -> Value {
    json!({ "Ref": logic_name })
}

/// `{"Fn::GetAtt": [logic_name, attribute]}`
pub fn get_att(logic_name: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logic_name, attribute] })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_json_shape() {
        let mut template = Template::new().with_description("orders");
        let mut queue = TemplateResource::new("AWS::SQS::Queue").with("QueueName", "jobs");
        queue.depends_on("IAMRoleExec");
        queue.depends_on("IAMRoleExec");
        template.add_resource("SQSQueueJobs", queue).unwrap();

        let rendered: Value =
            serde_json::from_str(&template.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(rendered["AWSTemplateFormatVersion"], json!(FORMAT_VERSION));
        assert_eq!(rendered["Description"], json!("orders"));
        assert_eq!(
            rendered["Resources"]["SQSQueueJobs"],
            json!({
                "Type": "AWS::SQS::Queue",
                "Properties": {"QueueName": "jobs"},
                "DependsOn": ["IAMRoleExec"]
            })
        );
    }

    #[test]
    fn test_duplicate_logic_name() {
        let mut template = Template::new();
        template
            .add_resource("A", TemplateResource::new("AWS::SNS::Topic"))
            .unwrap();
        assert!(matches!(
            template.add_resource("A", TemplateResource::new("AWS::SNS::Topic")),
            Err(TransformError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_push_creates_list() {
        let mut rule = TemplateResource::new("AWS::Events::Rule");
        rule.push("Targets", json!({"Id": "a"}));
        rule.push("Targets", json!({"Id": "b"}));
        assert_eq!(rule.properties["Targets"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_format_file_names() {
        assert_eq!(OutputFormat::Json.file_name(), "cloudformation_template.json");
        assert_eq!("yml".parse::<OutputFormat>().unwrap(), OutputFormat::Yaml);
        assert!("toml".parse::<OutputFormat>().is_err());
    }
}
