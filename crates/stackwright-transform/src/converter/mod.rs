//! Per-kind converters from resource meta to template resources

mod events;
mod iam;
mod lambda;
mod messaging;
mod storage;

pub use events::CloudWatchRuleConverter;
pub use iam::{IamPolicyConverter, IamRoleConverter};
pub use lambda::LambdaConverter;
pub use messaging::{KinesisStreamConverter, SnsTopicConverter, SqsQueueConverter};
pub use storage::{DynamoDbTableConverter, S3BucketConverter};

use crate::error::{Result, TransformError};
use crate::logic_name::logic_name;
use crate::template::Template;
use async_trait::async_trait;
use serde_json::{Map, Value};
use stackwright_cloud::{
    CloudError, Direction, DispatchTable, ResourceDescriptor, ResourceJob, ResourceKind,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Account-level values converters need for ARNs and code locations
#[derive(Debug, Clone)]
pub struct TransformSettings {
    pub region: String,
    pub account_id: String,
    pub deploy_target_bucket: Option<String>,
}

impl TransformSettings {
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            deploy_target_bucket: None,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.deploy_target_bucket = Some(bucket.into());
        self
    }

    pub fn role_arn(&self, role_name: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, role_name)
    }

    pub fn policy_arn(&self, policy_name: &str) -> String {
        format!("arn:aws:iam::{}:policy/{}", self.account_id, policy_name)
    }
}

/// What a converter sees while it runs
pub struct ConvertContext<'a> {
    pub template: &'a mut Template,
    pub settings: &'a TransformSettings,
    lookup: Option<&'a DispatchTable>,
}

impl<'a> ConvertContext<'a> {
    pub fn new(
        template: &'a mut Template,
        settings: &'a TransformSettings,
        lookup: Option<&'a DispatchTable>,
    ) -> Self {
        Self {
            template,
            settings,
            lookup,
        }
    }

    /// Logical id of `name` when it is already part of the template
    pub fn find(&self, kind: ResourceKind, name: &str) -> Option<String> {
        let logic = logic_name(kind, name);
        self.template.contains(&logic).then_some(logic)
    }

    /// Identifier of a deployed resource, asked from the provider.
    ///
    /// Returns `None` when no provider is attached, when it has no adapter
    /// for `kind`, or when the resource does not exist.
    pub async fn identify(&self, kind: ResourceKind, name: &str) -> Result<Option<String>> {
        let Some(table) = self.lookup else {
            return Ok(None);
        };
        let adapter = match table.adapter(kind, Direction::Create) {
            Ok(adapter) => adapter,
            Err(CloudError::HandlerNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let job = ResourceJob {
            name: name.to_string(),
            kind,
            meta: Map::new(),
            region: self.settings.region.clone(),
        };
        Ok(adapter.identify(&job).await?)
    }
}

#[async_trait]
pub trait ResourceConverter: Send + Sync {
    /// Add the template resources for `descriptor`.
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()>;
}

/// Converters by resource kind
#[derive(Default, Clone)]
pub struct ConverterTable {
    converters: HashMap<ResourceKind, Arc<dyn ResourceConverter>>,
}

impl ConverterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every built-in converter
    pub fn builtin() -> Self {
        let rule: Arc<dyn ResourceConverter> = Arc::new(CloudWatchRuleConverter);
        Self::new()
            .with(ResourceKind::IamPolicy, Arc::new(IamPolicyConverter))
            .with(ResourceKind::IamRole, Arc::new(IamRoleConverter))
            .with(ResourceKind::DynamodbTable, Arc::new(DynamoDbTableConverter))
            .with(ResourceKind::S3Bucket, Arc::new(S3BucketConverter))
            .with(ResourceKind::CloudwatchRule, rule.clone())
            .with(ResourceKind::EventbridgeRule, rule)
            .with(ResourceKind::SnsTopic, Arc::new(SnsTopicConverter))
            .with(ResourceKind::SqsQueue, Arc::new(SqsQueueConverter))
            .with(ResourceKind::KinesisStream, Arc::new(KinesisStreamConverter))
            .with(ResourceKind::Lambda, Arc::new(LambdaConverter))
    }

    pub fn register(&mut self, kind: ResourceKind, converter: Arc<dyn ResourceConverter>) {
        self.converters.insert(kind, converter);
    }

    pub fn with(mut self, kind: ResourceKind, converter: Arc<dyn ResourceConverter>) -> Self {
        self.register(kind, converter);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn ResourceConverter>> {
        self.converters.get(&kind)
    }
}

pub(crate) fn meta_str<'m>(
    descriptor: &'m ResourceDescriptor,
    key: &str,
) -> Result<&'m str> {
    descriptor
        .meta
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| TransformError::invalid(&descriptor.name, key, "expected a string"))
}

/// Check that an optional integer lies in `min..=max`.
pub(crate) fn bounded(
    name: &str,
    meta: &Map<String, Value>,
    key: &str,
    min: i64,
    max: i64,
) -> Result<Option<i64>> {
    let Some(value) = meta.get(key) else {
        return Ok(None);
    };
    let Some(n) = value.as_i64() else {
        return Err(TransformError::invalid(name, key, "expected an integer"));
    };
    if n < min || n > max {
        return Err(TransformError::invalid(
            name,
            key,
            format!("must be between {} and {}", min, max),
        ));
    }
    Ok(Some(n))
}

/// Strings or a single string as a list
pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
