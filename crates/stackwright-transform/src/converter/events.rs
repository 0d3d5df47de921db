use super::{ConvertContext, ResourceConverter, meta_str, string_list};
use crate::error::{Result, TransformError};
use crate::logic_name::{logic_name, prefixed};
use crate::template::TemplateResource;
use async_trait::async_trait;
use serde_json::{Value, json};
use stackwright_cloud::resource::validate_params;
use stackwright_cloud::{ResourceDescriptor, ResourceKind};

/// Converter for `cloudwatch_rule` and `eventbridge_rule`
pub struct CloudWatchRuleConverter;

fn event_pattern(descriptor: &ResourceDescriptor, rule_type: &str) -> Result<Value> {
    let meta = &descriptor.meta;
    match rule_type {
        "ec2" => {
            let mut pattern = json!({
                "source": ["aws.ec2"],
                "detail-type": ["EC2 Instance State-change Notification"]
            });
            let mut detail = serde_json::Map::new();
            let instances = string_list(meta.get("instance_ids"));
            if !instances.is_empty() {
                detail.insert("instance-id".to_string(), json!(instances));
            }
            let states = string_list(meta.get("instance_states"));
            if !states.is_empty() {
                detail.insert("state".to_string(), json!(states));
            }
            if !detail.is_empty() {
                pattern["detail"] = Value::Object(detail);
            }
            Ok(pattern)
        }
        "api_call" => {
            if let Some(custom) = meta.get("custom_pattern") {
                return Ok(custom.clone());
            }
            let Some(service) = meta.get("aws_service").and_then(Value::as_str) else {
                return Err(TransformError::invalid(
                    &descriptor.name,
                    "aws_service",
                    "aws_service or custom_pattern is required for api_call rules",
                ));
            };
            let mut pattern = json!({
                "detail-type": ["AWS API Call via CloudTrail"],
                "detail": {"eventSource": [format!("{}.amazonaws.com", service)]}
            });
            let operations = string_list(meta.get("operations"));
            if !operations.is_empty() {
                pattern["detail"]["eventName"] = json!(operations);
            }
            Ok(pattern)
        }
        other => Err(TransformError::invalid(
            &descriptor.name,
            "rule_type",
            format!("unsupported rule type {}", other),
        )),
    }
}

#[async_trait]
impl ResourceConverter for CloudWatchRuleConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        validate_params(name, &descriptor.meta, &["rule_type"])?;
        let rule_type = meta_str(descriptor, "rule_type")?;

        let mut rule = TemplateResource::new("AWS::Events::Rule")
            .with("Name", name)
            .with("Description", name)
            .with("State", "ENABLED");
        if rule_type == "schedule" {
            validate_params(name, &descriptor.meta, &["expression"])?;
            rule.set("ScheduleExpression", meta_str(descriptor, "expression")?);
        } else {
            rule.set("EventPattern", event_pattern(descriptor, rule_type)?);
        }

        for account in string_list(descriptor.meta.get("event_bus_accounts")) {
            let arn = format!(
                "arn:aws:events:{}:{}:event-bus/default",
                ctx.settings.region, account
            );
            rule.push(
                "Targets",
                json!({"Arn": arn, "Id": prefixed("EventBus", &[&account])}),
            );
        }

        ctx.template
            .add_resource(logic_name(descriptor.kind, name), rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TransformSettings;
    use crate::template::Template;

    fn descriptor(name: &str, meta: Value) -> ResourceDescriptor {
        ResourceDescriptor::new(
            name,
            ResourceKind::EventbridgeRule,
            meta.as_object().cloned().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_rule_types() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);

        CloudWatchRuleConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "table-writes",
                    json!({
                        "rule_type": "api_call",
                        "aws_service": "dynamodb",
                        "operations": ["PutItem"],
                        "event_bus_accounts": ["210987654321"]
                    }),
                ),
            )
            .await
            .unwrap();
        assert!(
            CloudWatchRuleConverter
                .convert(&mut ctx, &descriptor("bad", json!({"rule_type": "api_call"})))
                .await
                .is_err()
        );
        assert!(
            CloudWatchRuleConverter
                .convert(&mut ctx, &descriptor("tick", json!({"rule_type": "schedule"})))
                .await
                .is_err()
        );

        let rule = template.get("EventsRuleTableWrites").unwrap();
        assert_eq!(
            rule.properties["EventPattern"]["detail"],
            json!({"eventSource": ["dynamodb.amazonaws.com"], "eventName": ["PutItem"]})
        );
        assert_eq!(
            rule.properties["Targets"][0]["Arn"],
            json!("arn:aws:events:eu-west-1:210987654321:event-bus/default")
        );
        assert_eq!(template.len(), 1);
    }
}
