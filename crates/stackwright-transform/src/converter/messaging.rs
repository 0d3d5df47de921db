use super::{ConvertContext, ResourceConverter, bounded};
use crate::error::{Result, TransformError};
use crate::logic_name::{logic_name, prefixed};
use crate::template::{TemplateResource, reference};
use async_trait::async_trait;
use serde_json::{Value, json};
use stackwright_cloud::resource::validate_params;
use stackwright_cloud::trigger::EVENT_SOURCES_KEY;
use stackwright_cloud::{ResourceDescriptor, ResourceKind, TriggerKind};

const FIFO_SUFFIX: &str = ".fifo";

/// `(meta key, template property, min, max)`
const QUEUE_LIMITS: &[(&str, &str, i64, i64)] = &[
    ("delay_seconds", "DelaySeconds", 0, 900),
    ("maximum_message_size", "MaximumMessageSize", 1024, 262_144),
    ("message_retention_period", "MessageRetentionPeriod", 60, 1_209_600),
    (
        "receive_message_wait_time_seconds",
        "ReceiveMessageWaitTimeSeconds",
        0,
        20,
    ),
    ("visibility_timeout", "VisibilityTimeout", 0, 43_200),
    (
        "kms_data_key_reuse_period_seconds",
        "KmsDataKeyReusePeriodSeconds",
        60,
        86_400,
    ),
];

const MAX_SHARD_COUNT: i64 = 500;

fn flag(descriptor: &ResourceDescriptor, key: &str) -> bool {
    descriptor
        .meta
        .get(key)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub struct SqsQueueConverter;

#[async_trait]
impl ResourceConverter for SqsQueueConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let meta = &descriptor.meta;
        let fifo = flag(descriptor, "fifo_queue");
        let queue_name = if fifo && !name.ends_with(FIFO_SUFFIX) {
            format!("{}{}", name, FIFO_SUFFIX)
        } else {
            name.to_string()
        };

        let mut queue = TemplateResource::new("AWS::SQS::Queue").with("QueueName", queue_name);
        for (key, property, min, max) in QUEUE_LIMITS {
            if let Some(value) = bounded(name, meta, key, *min, *max)? {
                queue.set(property, value);
            }
        }
        if let Some(redrive) = meta.get("redrive_policy") {
            validate_params(
                name,
                redrive.as_object().unwrap_or(&Default::default()),
                &["deadLetterTargetArn", "maxReceiveCount"],
            )?;
            queue.set("RedrivePolicy", redrive.clone());
        }
        queue.set_opt("KmsMasterKeyId", meta.get("kms_master_key_id"));
        if fifo {
            queue.set("FifoQueue", true);
        }
        if flag(descriptor, "content_based_deduplication") {
            queue.set("ContentBasedDeduplication", true);
        }

        let queue_logic = logic_name(ResourceKind::SqsQueue, name);
        ctx.template.add_resource(queue_logic.clone(), queue)?;

        if let Some(policy) = meta.get("policy") {
            let queue_policy = TemplateResource::new("AWS::SQS::QueuePolicy")
                .with("PolicyDocument", policy.clone())
                .with("Queues", json!([reference(&queue_logic)]));
            ctx.template
                .add_resource(prefixed("SQSQueuePolicy", &[name]), queue_policy)?;
        }
        Ok(())
    }
}

pub struct SnsTopicConverter;

impl SnsTopicConverter {
    /// Route an events rule to the topic and let the events service publish.
    fn wire_rule(
        ctx: &mut ConvertContext<'_>,
        topic_logic: &str,
        trigger: &serde_json::Map<String, Value>,
    ) -> Result<()> {
        let rule = trigger
            .get("target_rule")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(rule_logic) = ctx.find(ResourceKind::CloudwatchRule, rule) else {
            return Err(TransformError::MissingReference {
                name: topic_logic.to_string(),
                kind: ResourceKind::CloudwatchRule.to_string(),
                target: rule.to_string(),
            });
        };
        if let Some(rule) = ctx.template.get_mut(&rule_logic) {
            rule.push(
                "Targets",
                json!({"Arn": reference(topic_logic), "Id": topic_logic}),
            );
        }

        let policy_logic = prefixed("SNSTopicPolicy", &[topic_logic]);
        if ctx.template.contains(&policy_logic) {
            return Ok(());
        }
        let policy = TemplateResource::new("AWS::SNS::TopicPolicy")
            .with("Topics", json!([reference(topic_logic)]))
            .with(
                "PolicyDocument",
                json!({
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Sid": format!("{}EventsPublish", topic_logic),
                        "Effect": "Allow",
                        "Principal": {"Service": "events.amazonaws.com"},
                        "Action": "sns:Publish",
                        "Resource": reference(topic_logic)
                    }]
                }),
            );
        ctx.template.add_resource(policy_logic, policy)
    }
}

#[async_trait]
impl ResourceConverter for SnsTopicConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let topic_logic = logic_name(ResourceKind::SnsTopic, name);
        let topic = TemplateResource::new("AWS::SNS::Topic")
            .with("TopicName", name)
            .with("Subscription", json!([]));
        ctx.template.add_resource(topic_logic.clone(), topic)?;

        let sources = descriptor
            .meta
            .get(EVENT_SOURCES_KEY)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for source in sources.iter().filter_map(Value::as_object) {
            let kind = source
                .get("resource_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .parse::<TriggerKind>()?;
            match kind {
                TriggerKind::CloudwatchRuleTrigger | TriggerKind::EventbridgeRuleTrigger => {
                    validate_params(name, source, kind.required_params())?;
                    Self::wire_rule(ctx, &topic_logic, source)?;
                }
                other => {
                    tracing::warn!("Topic {} doesn't support {} event sources", name, other);
                }
            }
        }
        Ok(())
    }
}

pub struct KinesisStreamConverter;

#[async_trait]
impl ResourceConverter for KinesisStreamConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        validate_params(name, &descriptor.meta, &["shard_count"])?;
        let shard_count = bounded(name, &descriptor.meta, "shard_count", 1, MAX_SHARD_COUNT)?;

        let stream = TemplateResource::new("AWS::Kinesis::Stream")
            .with("Name", name)
            .with("ShardCount", shard_count.unwrap_or(1));
        ctx.template
            .add_resource(logic_name(ResourceKind::KinesisStream, name), stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{CloudWatchRuleConverter, TransformSettings};
    use crate::template::Template;

    fn descriptor(name: &str, kind: ResourceKind, meta: Value) -> ResourceDescriptor {
        ResourceDescriptor::new(name, kind, meta.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_fifo_queue_with_limits() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);

        SqsQueueConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "jobs",
                    ResourceKind::SqsQueue,
                    json!({"fifo_queue": true, "visibility_timeout": 60, "policy": {}}),
                ),
            )
            .await
            .unwrap();

        let queue = template.get("SQSQueueJobs").unwrap();
        assert_eq!(queue.properties["QueueName"], json!("jobs.fifo"));
        assert_eq!(queue.properties["VisibilityTimeout"], json!(60));
        assert_eq!(queue.properties["FifoQueue"], json!(true));
        assert!(template.contains("SQSQueuePolicyJobs"));
    }

    #[tokio::test]
    async fn test_queue_limit_violation() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);
        let result = SqsQueueConverter
            .convert(
                &mut ctx,
                &descriptor("jobs", ResourceKind::SqsQueue, json!({"delay_seconds": 901})),
            )
            .await;
        assert!(matches!(result, Err(TransformError::InvalidParameter { .. })));
    }

    #[tokio::test]
    async fn test_topic_wired_to_rule() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);

        CloudWatchRuleConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "nightly",
                    ResourceKind::CloudwatchRule,
                    json!({"rule_type": "schedule", "expression": "rate(1 day)"}),
                ),
            )
            .await
            .unwrap();
        SnsTopicConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "alerts",
                    ResourceKind::SnsTopic,
                    json!({"event_sources": [
                        {"resource_type": "cloudwatch_rule_trigger", "target_rule": "nightly"}
                    ]}),
                ),
            )
            .await
            .unwrap();

        let rule = template.get("EventsRuleNightly").unwrap();
        assert_eq!(
            rule.properties["Targets"],
            json!([{"Arn": {"Ref": "SNSTopicAlerts"}, "Id": "SNSTopicAlerts"}])
        );
        assert!(template.contains("SNSTopicPolicySNSTopicAlerts"));
    }

    #[tokio::test]
    async fn test_stream_requires_shards() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);
        assert!(
            KinesisStreamConverter
                .convert(
                    &mut ctx,
                    &descriptor("clicks", ResourceKind::KinesisStream, json!({"shard_count": 0})),
                )
                .await
                .is_err()
        );
        KinesisStreamConverter
            .convert(
                &mut ctx,
                &descriptor("clicks", ResourceKind::KinesisStream, json!({"shard_count": 2})),
            )
            .await
            .unwrap();
        assert_eq!(
            template.get("KinesisStreamClicks").unwrap().properties["ShardCount"],
            json!(2)
        );
    }
}
