//! Descriptor list to template

use crate::converter::{ConvertContext, ConverterTable, TransformSettings};
use crate::error::{Result, TransformError};
use crate::logic_name::logic_name;
use crate::template::{OutputFormat, Template};
use stackwright_cloud::{DispatchTable, ResourceDescriptor};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct Transformer {
    converters: ConverterTable,
    settings: TransformSettings,
    lookup: Option<Arc<DispatchTable>>,
    description: Option<String>,
}

impl Transformer {
    /// Transformer with the built-in converters and no provider lookup
    pub fn new(settings: TransformSettings) -> Self {
        Self {
            converters: ConverterTable::builtin(),
            settings,
            lookup: None,
            description: None,
        }
    }

    /// Resolve references outside the template through deployed resources.
    pub fn with_lookup(mut self, table: Arc<DispatchTable>) -> Self {
        self.lookup = Some(table);
        self
    }

    pub fn with_converters(mut self, converters: ConverterTable) -> Self {
        self.converters = converters;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    /// Convert every descriptor in deploy priority order.
    ///
    /// Kinds without a converter are skipped with a warning. Declared
    /// dependencies that made it into the template become `DependsOn`.
    pub async fn transform(&self, descriptors: &[ResourceDescriptor]) -> Result<Template> {
        self.check_logic_names(descriptors)?;
        let mut ordered: Vec<&ResourceDescriptor> = descriptors.iter().collect();
        ordered.sort_by_key(|d| d.kind.deploy_priority());

        let mut template = Template::new();
        template.description = self.description.clone();

        for descriptor in ordered {
            let Some(converter) = self.converters.get(descriptor.kind) else {
                tracing::warn!(
                    "Transformation is not supported for {} resources, skipping {}",
                    descriptor.kind,
                    descriptor.name
                );
                continue;
            };

            let mut ctx =
                ConvertContext::new(&mut template, &self.settings, self.lookup.as_deref());
            converter.convert(&mut ctx, descriptor).await?;
            tracing::debug!("Converted {} {}", descriptor.kind, descriptor.name);

            Self::link_dependencies(&mut template, descriptor);
        }

        tracing::info!("Template has {} resources", template.len());
        Ok(template)
    }

    /// Names like `my-queue` and `my_queue` mangle to the same logical id.
    fn check_logic_names(&self, descriptors: &[ResourceDescriptor]) -> Result<()> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for descriptor in descriptors {
            if self.converters.get(descriptor.kind).is_none() {
                continue;
            }
            let id = logic_name(descriptor.kind, &descriptor.name);
            if let Some(first) = seen.insert(id.clone(), &descriptor.name) {
                return Err(TransformError::LogicNameCollision {
                    logic_name: id,
                    first: first.to_string(),
                    second: descriptor.name.clone(),
                });
            }
        }
        Ok(())
    }

    fn link_dependencies(template: &mut Template, descriptor: &ResourceDescriptor) {
        let Some(deps) = descriptor.meta.get("dependencies").and_then(|d| d.as_array()) else {
            return;
        };
        let own = logic_name(descriptor.kind, &descriptor.name);
        for dep in deps {
            let (Some(name), Some(kind)) = (
                dep.get("resource_name").and_then(|v| v.as_str()),
                dep.get("resource_type")
                    .and_then(|v| v.as_str())
                    .and_then(|t| t.parse().ok()),
            ) else {
                continue;
            };
            let dep_logic = logic_name(kind, name);
            if !template.contains(&dep_logic) {
                tracing::debug!("Dependency {} of {} is outside the template", name, descriptor.name);
                continue;
            }
            if let Some(resource) = template.get_mut(&own) {
                resource.depends_on(dep_logic);
            }
        }
    }

    /// Render `template` into `dir`, returning the written path.
    pub async fn write(
        &self,
        template: &Template,
        dir: impl AsRef<Path>,
        format: OutputFormat,
    ) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format.file_name());
        tokio::fs::write(&path, template.render(format)?).await?;
        tracing::info!("Template written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use stackwright_cloud::ResourceKind;

    fn descriptors() -> Vec<ResourceDescriptor> {
        [
            (
                "worker",
                json!({
                    "resource_type": "lambda",
                    "iam_role_name": "exec",
                    "runtime": "python3.12",
                    "dependencies": [
                        {"resource_name": "jobs", "resource_type": "sqs_queue"},
                        {"resource_name": "elsewhere", "resource_type": "sns_topic"}
                    ]
                }),
            ),
            ("exec", json!({"resource_type": "iam_role", "principal_service": "lambda"})),
            ("jobs", json!({"resource_type": "sqs_queue"})),
            ("api", json!({"resource_type": "api_gateway", "deploy_stage": "prod"})),
        ]
        .into_iter()
        .map(|(name, meta)| ResourceDescriptor::from_meta(name, meta).unwrap())
        .collect()
    }

    #[tokio::test]
    async fn test_colliding_logic_names_name_both_resources() {
        let transformer = Transformer::new(TransformSettings::new("eu-west-1", "123456789012"));
        let descriptors = vec![
            ResourceDescriptor::from_meta("my-queue", json!({"resource_type": "sqs_queue"}))
                .unwrap(),
            ResourceDescriptor::from_meta("my_queue", json!({"resource_type": "sqs_queue"}))
                .unwrap(),
        ];

        let err = transformer.transform(&descriptors).await.unwrap_err();
        assert!(matches!(err, TransformError::LogicNameCollision { .. }));
        let message = err.to_string();
        assert!(message.contains("my-queue"));
        assert!(message.contains("my_queue"));
        assert!(message.contains("SQSQueueMyQueue"));
    }

    #[tokio::test]
    async fn test_transform_in_deploy_order() {
        let transformer = Transformer::new(TransformSettings::new("eu-west-1", "123456789012"));
        let template = transformer.transform(&descriptors()).await.unwrap();

        let ids: Vec<&str> = template.resources.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["IAMRoleExec", "SQSQueueJobs", "LambdaFunctionWorker"]);

        let function = template.get("LambdaFunctionWorker").unwrap();
        assert_eq!(
            function.properties["Role"],
            json!({"Fn::GetAtt": ["IAMRoleExec", "Arn"]})
        );
        assert_eq!(function.depends_on, vec!["IAMRoleExec", "SQSQueueJobs"]);
    }

    #[tokio::test]
    async fn test_write_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let transformer = Transformer::new(TransformSettings::new("eu-west-1", "123456789012"))
            .with_description("orders");
        let template = transformer.transform(&descriptors()).await.unwrap();

        let path = transformer
            .write(&template, temp_dir.path().join("out"), OutputFormat::Yaml)
            .await
            .unwrap();
        assert!(path.ends_with("cloudformation_template.yaml"));

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_yaml::from_str(&content).unwrap();
        assert_eq!(parsed["Description"], json!("orders"));
        assert_eq!(
            parsed["Resources"]["SQSQueueJobs"]["Type"],
            json!("AWS::SQS::Queue")
        );
        assert!(ResourceKind::ApiGateway.deploy_priority() > ResourceKind::Lambda.deploy_priority());
    }
}
