//! Lambda functions and their event sources

use super::iam::inline_policy;
use super::storage::{DEFAULT_STREAM_VIEW_TYPE, enable_stream};
use super::{ConvertContext, ResourceConverter, meta_str};
use crate::error::{Result, TransformError};
use crate::logic_name::{logic_name, prefixed};
use crate::template::{TemplateResource, get_att, reference};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use stackwright_cloud::resource::validate_params;
use stackwright_cloud::trigger::EVENT_SOURCES_KEY;
use stackwright_cloud::{ResourceDescriptor, ResourceKind, TriggerKind};

const LOG_GROUP_PREFIX: &str = "/aws/lambda/";

pub struct LambdaConverter;

/// How the function's execution role is referenced
enum RoleRef {
    /// Role converted in this template
    Template(String),
    /// Role outside the template, known by ARN
    External { name: String, arn: String },
}

impl RoleRef {
    fn arn(&self) -> Value {
        match self {
            RoleRef::Template(logic) => get_att(logic, "Arn"),
            RoleRef::External { arn, .. } => Value::String(arn.clone()),
        }
    }

    /// Value for a policy's `Roles` list
    fn policy_target(&self) -> Value {
        match self {
            RoleRef::Template(logic) => reference(logic),
            RoleRef::External { name, .. } => Value::String(name.clone()),
        }
    }
}

/// The function being wired
struct Function<'d> {
    name: &'d str,
    logic: String,
    role: RoleRef,
}

impl Function<'_> {
    fn arn(&self) -> Value {
        get_att(&self.logic, "Arn")
    }

    fn permission(&self, principal: &str, source: &str, source_arn: Value) -> TemplateResource {
        TemplateResource::new("AWS::Lambda::Permission")
            .with("FunctionName", self.arn())
            .with("Action", "lambda:InvokeFunction")
            .with("Principal", format!("{}.amazonaws.com", principal))
            .with("SourceArn", source_arn)
            .with(
                "SourceAccount",
                json!({"Ref": "AWS::AccountId"}),
            )
            .with("Description", format!("{} invocation from {}", self.name, source))
    }

    fn event_source_mapping(
        &self,
        source: &str,
        source_arn: Value,
        batch_size: &Value,
        starting_position: Option<&Value>,
    ) -> (String, TemplateResource) {
        let mut mapping = TemplateResource::new("AWS::Lambda::EventSourceMapping")
            .with("BatchSize", batch_size.clone())
            .with("Enabled", true)
            .with("EventSourceArn", source_arn)
            .with("FunctionName", self.arn());
        mapping.set_opt("StartingPosition", starting_position);
        mapping.depends_on(self.logic.clone());
        (
            prefixed("LambdaEventSourceMapping", &[self.name, source]),
            mapping,
        )
    }
}

fn target<'m>(trigger: &'m Map<String, Value>, kind: TriggerKind) -> &'m str {
    trigger
        .get(kind.target_key())
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn skip_missing(function: &Function<'_>, kind: ResourceKind, source: &str) {
    tracing::warn!(
        "{} {} is not in the template, skipping its trigger of {}",
        kind,
        source,
        function.name
    );
}

impl LambdaConverter {
    async fn role(ctx: &ConvertContext<'_>, role_name: &str) -> Result<RoleRef> {
        if let Some(logic) = ctx.find(ResourceKind::IamRole, role_name) {
            return Ok(RoleRef::Template(logic));
        }
        let arn = match ctx.identify(ResourceKind::IamRole, role_name).await? {
            Some(arn) => arn,
            None => {
                tracing::warn!(
                    "Role '{}' is not in the template, building its ARN",
                    role_name
                );
                ctx.settings.role_arn(role_name)
            }
        };
        Ok(RoleRef::External {
            name: role_name.to_string(),
            arn,
        })
    }

    async fn layers(
        ctx: &ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<Option<Vec<Value>>> {
        let Some(layers) = descriptor.meta.get("layers").and_then(Value::as_array) else {
            return Ok(None);
        };
        let mut refs = Vec::with_capacity(layers.len());
        for layer in layers.iter().filter_map(Value::as_str) {
            if let Some(logic) = ctx.find(ResourceKind::LambdaLayer, layer) {
                refs.push(reference(&logic));
                continue;
            }
            match ctx.identify(ResourceKind::LambdaLayer, layer).await? {
                Some(arn) => refs.push(Value::String(arn)),
                None => {
                    return Err(TransformError::MissingReference {
                        name: descriptor.name.clone(),
                        kind: ResourceKind::LambdaLayer.to_string(),
                        target: layer.to_string(),
                    });
                }
            }
        }
        Ok(Some(refs))
    }

    fn function_resource(
        ctx: &ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
        role: &RoleRef,
    ) -> Result<TemplateResource> {
        let meta = &descriptor.meta;
        let runtime = meta_str(descriptor, "runtime")?.to_lowercase();

        let mut function = TemplateResource::new("AWS::Lambda::Function")
            .with("FunctionName", descriptor.name.as_str())
            .with("Role", role.arn())
            .with("Runtime", runtime);
        function.set_opt("Handler", meta.get("func_name"));
        function.set_opt("MemorySize", meta.get("memory"));
        function.set_opt("Timeout", meta.get("timeout"));
        function.set_opt("ReservedConcurrentExecutions", meta.get("max_concurrency"));

        match (
            ctx.settings.deploy_target_bucket.as_deref(),
            meta.get("s3_path").and_then(Value::as_str),
        ) {
            (Some(bucket), Some(key)) => {
                function.set("Code", json!({"S3Bucket": bucket, "S3Key": key}));
            }
            _ => tracing::warn!(
                "No deployment package location for {}, 'Code' is left out",
                descriptor.name
            ),
        }

        if let Some(vars) = meta.get("env_variables").filter(|v| v.is_object()) {
            function.set("Environment", json!({"Variables": vars}));
        }
        if let (Some(subnets), Some(groups)) =
            (meta.get("subnet_ids"), meta.get("security_group_ids"))
        {
            function.set(
                "VpcConfig",
                json!({"SubnetIds": subnets, "SecurityGroupIds": groups}),
            );
        }
        if let Some(mode) = meta.get("tracing_mode") {
            function.set("TracingConfig", json!({"Mode": mode}));
        }
        if let Some(dlq) = meta.get("dl_resource_name").and_then(Value::as_str) {
            let dl_type = meta
                .get("dl_resource_type")
                .and_then(Value::as_str)
                .unwrap_or("sqs");
            let arn = match dl_type {
                "sns" => format!(
                    "arn:aws:sns:{}:{}:{}",
                    ctx.settings.region, ctx.settings.account_id, dlq
                ),
                _ => format!(
                    "arn:aws:sqs:{}:{}:{}",
                    ctx.settings.region, ctx.settings.account_id, dlq
                ),
            };
            function.set("DeadLetterConfig", json!({"TargetArn": arn}));
        }
        if let RoleRef::Template(logic) = role {
            function.depends_on(logic.clone());
        }
        Ok(function)
    }

    fn wire(
        ctx: &mut ConvertContext<'_>,
        function: &Function<'_>,
        kind: TriggerKind,
        trigger: &Map<String, Value>,
    ) -> Result<()> {
        let source = target(trigger, kind);
        match kind {
            TriggerKind::DynamodbTrigger => {
                let Some(table_logic) = ctx.find(ResourceKind::DynamodbTable, source) else {
                    skip_missing(function, ResourceKind::DynamodbTable, source);
                    return Ok(());
                };
                if let Some(table) = ctx.template.get_mut(&table_logic) {
                    enable_stream(table, DEFAULT_STREAM_VIEW_TYPE);
                }
                let latest = json!("LATEST");
                let (logic, mapping) = function.event_source_mapping(
                    source,
                    get_att(&table_logic, "StreamArn"),
                    &trigger["batch_size"],
                    Some(&latest),
                );
                ctx.template.add_resource(logic, mapping)
            }
            TriggerKind::SqsTrigger => {
                let Some(queue_logic) = ctx.find(ResourceKind::SqsQueue, source) else {
                    skip_missing(function, ResourceKind::SqsQueue, source);
                    return Ok(());
                };
                let (logic, mapping) = function.event_source_mapping(
                    source,
                    get_att(&queue_logic, "Arn"),
                    &trigger["batch_size"],
                    None,
                );
                ctx.template.add_resource(logic, mapping)
            }
            TriggerKind::KinesisTrigger => {
                let Some(stream_logic) = ctx.find(ResourceKind::KinesisStream, source) else {
                    skip_missing(function, ResourceKind::KinesisStream, source);
                    return Ok(());
                };
                let policy_name = format!("{}KinesisTo{}Lambda", source, function.name);
                let policy_logic = prefixed("IAMPolicy", &[&policy_name]);
                let document = json!({
                    "Version": "2012-10-17",
                    "Statement": [
                        {
                            "Effect": "Allow",
                            "Action": ["lambda:InvokeFunction"],
                            "Resource": [function.arn()]
                        },
                        {
                            "Effect": "Allow",
                            "Action": [
                                "kinesis:DescribeStreams",
                                "kinesis:DescribeStream",
                                "kinesis:ListStreams",
                                "kinesis:GetShardIterator",
                                "kinesis:GetRecords"
                            ],
                            "Resource": get_att(&stream_logic, "Arn")
                        }
                    ]
                });
                ctx.template.add_resource(
                    policy_logic.clone(),
                    inline_policy(&policy_name, function.role.policy_target(), document),
                )?;
                let (logic, mut mapping) = function.event_source_mapping(
                    source,
                    get_att(&stream_logic, "Arn"),
                    &trigger["batch_size"],
                    trigger.get("starting_position"),
                );
                mapping.depends_on(policy_logic);
                ctx.template.add_resource(logic, mapping)
            }
            TriggerKind::CloudwatchRuleTrigger | TriggerKind::EventbridgeRuleTrigger => {
                let Some(rule_logic) = ctx.find(ResourceKind::CloudwatchRule, source) else {
                    skip_missing(function, ResourceKind::CloudwatchRule, source);
                    return Ok(());
                };
                if let Some(rule) = ctx.template.get_mut(&rule_logic) {
                    rule.push(
                        "Targets",
                        json!({"Arn": function.arn(), "Id": function.logic}),
                    );
                }
                let permission =
                    function.permission("events", source, get_att(&rule_logic, "Arn"));
                ctx.template.add_resource(
                    prefixed("LambdaPermission", &[function.name, source]),
                    permission,
                )
            }
            TriggerKind::S3Trigger => {
                let Some(bucket_logic) = ctx.find(ResourceKind::S3Bucket, source) else {
                    skip_missing(function, ResourceKind::S3Bucket, source);
                    return Ok(());
                };
                let permission_logic = prefixed("LambdaPermission", &[function.name, source]);
                let permission = function.permission(
                    "s3",
                    source,
                    Value::String(format!("arn:aws:s3:::{}", source)),
                );
                ctx.template.add_resource(permission_logic.clone(), permission)?;

                let filter = trigger.get("filter_rules").and_then(Value::as_array).map(|rules| {
                    json!({"S3Key": {"Rules": rules}})
                });
                let events: Vec<Value> = match &trigger["s3_events"] {
                    Value::Array(events) => events.clone(),
                    other => vec![other.clone()],
                };
                if let Some(bucket) = ctx.template.get_mut(&bucket_logic) {
                    bucket.depends_on(permission_logic);
                    let config = bucket
                        .properties
                        .entry("NotificationConfiguration")
                        .or_insert_with(|| json!({}));
                    for event in events {
                        let mut entry = json!({"Event": event, "Function": function.arn()});
                        if let Some(filter) = &filter {
                            entry["Filter"] = filter.clone();
                        }
                        match config.get_mut("LambdaConfigurations") {
                            Some(Value::Array(configs)) => configs.push(entry),
                            _ => config["LambdaConfigurations"] = json!([entry]),
                        }
                    }
                }
                Ok(())
            }
            TriggerKind::SnsTopicTrigger => {
                let Some(topic_logic) = ctx.find(ResourceKind::SnsTopic, source) else {
                    return Err(TransformError::MissingReference {
                        name: function.name.to_string(),
                        kind: ResourceKind::SnsTopic.to_string(),
                        target: source.to_string(),
                    });
                };
                if let Some(topic) = ctx.template.get_mut(&topic_logic) {
                    topic.push(
                        "Subscription",
                        json!({"Protocol": "lambda", "Endpoint": function.arn()}),
                    );
                }
                let permission = function.permission("sns", source, reference(&topic_logic));
                ctx.template.add_resource(
                    prefixed("LambdaPermission", &[function.name, source]),
                    permission,
                )
            }
        }
    }
}

#[async_trait]
impl ResourceConverter for LambdaConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        validate_params(name, &descriptor.meta, &["iam_role_name", "runtime"])?;

        let role = Self::role(ctx, meta_str(descriptor, "iam_role_name")?).await?;
        let layers = Self::layers(ctx, descriptor).await?;
        let mut resource = Self::function_resource(ctx, descriptor, &role)?;
        if let Some(layers) = layers {
            resource.set("Layers", layers);
        }

        let function = Function {
            name,
            logic: logic_name(ResourceKind::Lambda, name),
            role,
        };
        ctx.template.add_resource(function.logic.clone(), resource)?;

        if let Some(days) = descriptor.meta.get("logs_expiration") {
            let log_group = TemplateResource::new("AWS::Logs::LogGroup")
                .with("LogGroupName", format!("{}{}", LOG_GROUP_PREFIX, name))
                .with("RetentionInDays", days.clone());
            ctx.template
                .add_resource(prefixed("LogsLogGroup", &[name]), log_group)?;
        }

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
            validate_params(name, source, kind.required_params())?;
            Self::wire(ctx, &function, kind, source)?;
        }
        Ok(())
    }
}
