//! Event source wiring for compute resources
//!
//! A lambda's `event_sources` list declares triggers. After the function
//! itself exists, each trigger is attached through the wiring registered
//! for its trigger kind.

use crate::adapter::ProviderResult;
use crate::error::{CloudError, Result};
use crate::region::resolve_spec;
use crate::resource::{Description, RegionSpec, ResourceJob, validate_params};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Meta key holding the trigger list
pub const EVENT_SOURCES_KEY: &str = "event_sources";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    DynamodbTrigger,
    CloudwatchRuleTrigger,
    EventbridgeRuleTrigger,
    S3Trigger,
    SnsTopicTrigger,
    KinesisTrigger,
    SqsTrigger,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 7] = [
        TriggerKind::DynamodbTrigger,
        TriggerKind::CloudwatchRuleTrigger,
        TriggerKind::EventbridgeRuleTrigger,
        TriggerKind::S3Trigger,
        TriggerKind::SnsTopicTrigger,
        TriggerKind::KinesisTrigger,
        TriggerKind::SqsTrigger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::DynamodbTrigger => "dynamodb_trigger",
            TriggerKind::CloudwatchRuleTrigger => "cloudwatch_rule_trigger",
            TriggerKind::EventbridgeRuleTrigger => "eventbridge_rule_trigger",
            TriggerKind::S3Trigger => "s3_trigger",
            TriggerKind::SnsTopicTrigger => "sns_topic_trigger",
            TriggerKind::KinesisTrigger => "kinesis_trigger",
            TriggerKind::SqsTrigger => "sqs_trigger",
        }
    }

    /// Meta keys a trigger of this kind must declare
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            TriggerKind::DynamodbTrigger => &["target_table", "batch_size"],
            TriggerKind::SqsTrigger => &["target_queue", "batch_size"],
            TriggerKind::CloudwatchRuleTrigger | TriggerKind::EventbridgeRuleTrigger => {
                &["target_rule"]
            }
            TriggerKind::S3Trigger => &["target_bucket", "s3_events"],
            TriggerKind::SnsTopicTrigger => &["target_topic"],
            TriggerKind::KinesisTrigger => &["target_stream", "batch_size", "starting_position"],
        }
    }

    /// Meta key naming the event source this trigger listens to
    pub fn target_key(&self) -> &'static str {
        self.required_params()[0]
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        TriggerKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CloudError::UnsupportedResourceType(s.to_string()))
    }
}

/// One trigger to attach to one function in one region
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerJob {
    pub kind: TriggerKind,
    pub region: String,
    pub meta: Map<String, Value>,
}

impl TriggerJob {
    /// Name of the event source (table, queue, topic, ...) being wired
    pub fn target(&self) -> Option<&str> {
        self.meta.get(self.kind.target_key()).and_then(Value::as_str)
    }
}

/// Provider side of trigger wiring
#[async_trait]
pub trait TriggerWiring: Send + Sync {
    /// Connect `trigger` to the freshly created (or existing) function.
    async fn attach(&self, function: &Description, trigger: &TriggerJob) -> ProviderResult<()>;

    /// Disconnect `trigger` before the function is removed.
    async fn detach(&self, _function: &ResourceJob, _trigger: &TriggerJob) -> ProviderResult<()> {
        Ok(())
    }
}

/// Triggers that apply to `job`, in the job's region.
///
/// A trigger without a region follows its function. A trigger with its own
/// directive is resolved like a resource; it applies to this job only when
/// the job's region is among the resolved ones.
pub fn plan_triggers(
    job: &ResourceJob,
    available_regions: &[String],
    default_region: &str,
) -> Result<Vec<TriggerJob>> {
    let Some(sources) = job.meta.get(EVENT_SOURCES_KEY) else {
        return Ok(Vec::new());
    };
    let Some(sources) = sources.as_array() else {
        return Err(CloudError::InvalidResource {
            name: job.name.clone(),
            reason: format!("'{}' must be a list", EVENT_SOURCES_KEY),
        });
    };

    let mut triggers = Vec::with_capacity(sources.len());
    for source in sources {
        let Some(meta) = source.as_object() else {
            return Err(CloudError::InvalidResource {
                name: job.name.clone(),
                reason: "event source must be an object".to_string(),
            });
        };
        let kind = meta
            .get("resource_type")
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::InvalidResource {
                name: job.name.clone(),
                reason: "event source is missing 'resource_type'".to_string(),
            })?
            .parse::<TriggerKind>()?;
        validate_params(&job.name, meta, kind.required_params())?;

        let spec = RegionSpec::from_value(meta.get("region"));
        let applies = match spec {
            RegionSpec::Default => true,
            spec => resolve_spec(
                &spec,
                &job.name,
                job.kind,
                available_regions,
                default_region,
            )?
            .contains(&job.region),
        };
        if !applies {
            tracing::debug!(
                "Skipping {} of {} outside region {}",
                kind,
                job.name,
                job.region
            );
            continue;
        }

        triggers.push(TriggerJob {
            kind,
            region: job.region.clone(),
            meta: meta.clone(),
        });
    }
    Ok(triggers)
}
