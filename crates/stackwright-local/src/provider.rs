//! Local provider implementation

use crate::cloud::{LocalCloud, ResourceRecord};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use stackwright_cloud::trigger::{TriggerJob, TriggerKind, TriggerWiring};
use stackwright_cloud::{
    Description, ProviderError, ProviderResult, ResourceAdapter, ResourceJob, ResourceKind,
    ensure_created, ensure_removed,
};
use std::sync::Arc;

const ROLE_NOT_ASSUMABLE: &str = "The role defined for the function cannot be assumed by Lambda.";

/// Meta keys each kind must carry before anything is stored
fn required_params(kind: ResourceKind, meta: &serde_json::Map<String, Value>) -> Vec<&'static str> {
    match kind {
        ResourceKind::Lambda => vec!["iam_role_name", "runtime"],
        ResourceKind::LambdaLayer => vec!["runtimes", "deployment_package"],
        ResourceKind::DynamodbTable => vec!["hash_key_name", "hash_key_type"],
        ResourceKind::CloudwatchAlarm => vec![
            "metric_name",
            "namespace",
            "period",
            "threshold",
            "evaluation_periods",
            "comparison_operator",
            "statistic",
        ],
        ResourceKind::CloudwatchRule | ResourceKind::EventbridgeRule => {
            if meta.get("rule_type").and_then(Value::as_str) == Some("schedule") {
                vec!["rule_type", "expression"]
            } else {
                vec!["rule_type"]
            }
        }
        ResourceKind::ApiGateway => vec!["deploy_stage"],
        _ => Vec::new(),
    }
}

/// API operation names, used in error messages and retry logs
fn operation(kind: ResourceKind, verb: &str) -> String {
    let noun = match kind {
        ResourceKind::IamPolicy => "Policy",
        ResourceKind::IamRole => "Role",
        ResourceKind::DynamodbTable => "Table",
        ResourceKind::S3Bucket => "Bucket",
        ResourceKind::CloudwatchRule | ResourceKind::EventbridgeRule => "Rule",
        ResourceKind::SnsTopic => "Topic",
        ResourceKind::SqsQueue => "Queue",
        ResourceKind::KinesisStream => "Stream",
        ResourceKind::CloudwatchAlarm => "Alarm",
        ResourceKind::LambdaLayer => "LayerVersion",
        ResourceKind::Lambda => "Function",
        ResourceKind::StepFunctions => "StateMachine",
        ResourceKind::ApiGateway => "RestApi",
    };
    format!("{}{}", verb, noun)
}

fn describe_record(job: &ResourceJob, record: &ResourceRecord) -> Description {
    Description::new(job, record.describe()).with_identifier(record.arn.clone())
}

/// Adapter for one resource kind backed by [`LocalCloud`]
pub struct LocalAdapter {
    cloud: Arc<LocalCloud>,
    kind: ResourceKind,
}

impl LocalAdapter {
    pub fn new(cloud: Arc<LocalCloud>, kind: ResourceKind) -> Self {
        Self { cloud, kind }
    }

    async fn find(&self, job: &ResourceJob) -> ProviderResult<Option<ResourceRecord>> {
        self.cloud
            .get(self.kind, &job.region, &job.name)
            .await
            .map_err(|e| e.into_provider(&operation(self.kind, "Get")))
    }

    /// Functions need their execution role to exist first.
    async fn check_role(&self, job: &ResourceJob) -> ProviderResult<()> {
        let Some(role) = job.meta.get("iam_role_name").and_then(Value::as_str) else {
            return Ok(());
        };
        let found = self
            .cloud
            .get(ResourceKind::IamRole, &job.region, role)
            .await
            .map_err(|e| e.into_provider("GetRole"))?;
        if found.is_none() {
            return Err(ProviderError::service(
                "CreateFunction",
                "InvalidParameterValueException",
                ROLE_NOT_ASSUMABLE,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceAdapter for LocalAdapter {
    async fn create(&self, job: &ResourceJob) -> ProviderResult<Description> {
        job.require_params(&required_params(self.kind, &job.meta))?;
        if self.kind == ResourceKind::Lambda {
            self.check_role(job).await?;
        }

        let describe = || async {
            let record = self.find(job).await?;
            Ok::<_, ProviderError>(record.map(|record| describe_record(job, &record)))
        };
        let create = || async {
            let record = self
                .cloud
                .insert(self.kind, &job.region, &job.name, job.meta.clone())
                .await
                .map_err(|e| e.into_provider(&operation(self.kind, "Create")))?;
            Ok::<_, ProviderError>(describe_record(job, &record))
        };
        ensure_created(job, describe, create).await
    }

    async fn remove(&self, job: &ResourceJob) -> ProviderResult<()> {
        ensure_removed(job, || async {
            self.cloud
                .delete(self.kind, &job.region, &job.name)
                .await
                .map_err(|e| e.into_provider(&operation(self.kind, "Delete")))
        })
        .await
    }

    fn supports_update(&self) -> bool {
        self.kind.update_priority().is_some()
    }

    async fn update(&self, job: &ResourceJob) -> ProviderResult<Description> {
        let op = operation(self.kind, "Update");
        if !self.supports_update() {
            return Err(ProviderError::Unsupported {
                operation: op,
                kind: self.kind,
            });
        }
        job.require_params(&required_params(self.kind, &job.meta))?;

        let Some(mut record) = self.find(job).await? else {
            return Err(ProviderError::not_found(op, &job.name));
        };
        record.meta = job.meta.clone();
        record.updated_at = Utc::now();
        self.cloud
            .replace(&record)
            .await
            .map_err(|e| e.into_provider(&op))?;

        tracing::info!("Updated {} {} in {}", self.kind, job.name, job.region);
        Ok(describe_record(job, &record))
    }

    async fn identify(&self, job: &ResourceJob) -> ProviderResult<Option<String>> {
        Ok(self.find(job).await?.map(|record| record.arn))
    }
}

/// Event source wiring stored on the function record
pub struct LocalTriggerWiring {
    cloud: Arc<LocalCloud>,
}

impl LocalTriggerWiring {
    pub fn new(cloud: Arc<LocalCloud>) -> Self {
        Self { cloud }
    }

    fn source_kind(kind: TriggerKind) -> ResourceKind {
        match kind {
            TriggerKind::DynamodbTrigger => ResourceKind::DynamodbTable,
            TriggerKind::CloudwatchRuleTrigger => ResourceKind::CloudwatchRule,
            TriggerKind::EventbridgeRuleTrigger => ResourceKind::EventbridgeRule,
            TriggerKind::S3Trigger => ResourceKind::S3Bucket,
            TriggerKind::SnsTopicTrigger => ResourceKind::SnsTopic,
            TriggerKind::KinesisTrigger => ResourceKind::KinesisStream,
            TriggerKind::SqsTrigger => ResourceKind::SqsQueue,
        }
    }

    fn operation(kind: TriggerKind) -> &'static str {
        match kind {
            TriggerKind::DynamodbTrigger | TriggerKind::KinesisTrigger | TriggerKind::SqsTrigger => {
                "CreateEventSourceMapping"
            }
            TriggerKind::CloudwatchRuleTrigger | TriggerKind::EventbridgeRuleTrigger => {
                "PutTargets"
            }
            TriggerKind::S3Trigger => "PutBucketNotificationConfiguration",
            TriggerKind::SnsTopicTrigger => "Subscribe",
        }
    }
}

#[async_trait]
impl TriggerWiring for LocalTriggerWiring {
    async fn attach(&self, function: &Description, trigger: &TriggerJob) -> ProviderResult<()> {
        let op = Self::operation(trigger.kind);
        let source_kind = Self::source_kind(trigger.kind);
        let source = trigger.target().unwrap_or_default();

        let found = self
            .cloud
            .get(source_kind, &trigger.region, source)
            .await
            .map_err(|e| e.into_provider(op))?;
        if found.is_none() {
            if trigger.kind == TriggerKind::SnsTopicTrigger {
                tracing::warn!(
                    "Topic {} doesn't exist in {}, skipping trigger of {}",
                    source,
                    trigger.region,
                    function.resource_name
                );
                return Ok(());
            }
            return Err(ProviderError::service(
                op,
                "ResourceNotFoundException",
                format!("{} {} does not exist in {}", source_kind, source, trigger.region),
            ));
        }

        let Some(mut record) = self
            .cloud
            .get(
                function.resource_type,
                &function.region,
                &function.resource_name,
            )
            .await
            .map_err(|e| e.into_provider(op))?
        else {
            return Err(ProviderError::not_found(op, &function.resource_name));
        };

        let entry = Value::Object(trigger.meta.clone());
        if record.triggers.contains(&entry) {
            tracing::debug!("{} of {} is already wired", trigger.kind, record.name);
            return Ok(());
        }
        record.triggers.push(entry);
        record.updated_at = Utc::now();
        self.cloud
            .replace(&record)
            .await
            .map_err(|e| e.into_provider(op))
    }

    async fn detach(&self, function: &ResourceJob, trigger: &TriggerJob) -> ProviderResult<()> {
        let op = "DeleteEventSourceMapping";
        let Some(mut record) = self
            .cloud
            .get(function.kind, &function.region, &function.name)
            .await
            .map_err(|e| e.into_provider(op))?
        else {
            return Ok(());
        };

        let entry = Value::Object(trigger.meta.clone());
        let before = record.triggers.len();
        record.triggers.retain(|t| *t != entry);
        if record.triggers.len() == before {
            return Ok(());
        }
        self.cloud
            .replace(&record)
            .await
            .map_err(|e| e.into_provider(op))
    }
}
