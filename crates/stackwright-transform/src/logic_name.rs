//! Logical ids for template resources
//!
//! Every cross-reference inside a template goes through these functions,
//! so a resource and the things pointing at it always agree on its id.

use stackwright_cloud::ResourceKind;

/// Split each part on non-alphanumerics, capitalize every segment and join.
///
/// `to_logic_name(&["my-queue_dlq"])` is `MyQueueDlq`.
pub fn to_logic_name(parts: &[&str]) -> String {
    let mut logic = String::new();
    for part in parts {
        for segment in part.split(|c: char| !c.is_ascii_alphanumeric()) {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                logic.push(first.to_ascii_uppercase());
                logic.push_str(chars.as_str());
            }
        }
    }
    logic
}

/// `prefix` followed by [`to_logic_name`] of `parts`
pub fn prefixed(prefix: &str, parts: &[&str]) -> String {
    format!("{}{}", prefix, to_logic_name(parts))
}

/// Template type prefix of a resource kind
pub fn kind_prefix(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::IamPolicy => "IAMManagedPolicy",
        ResourceKind::IamRole => "IAMRole",
        ResourceKind::DynamodbTable => "DynamoDBTable",
        ResourceKind::S3Bucket => "S3Bucket",
        ResourceKind::CloudwatchRule | ResourceKind::EventbridgeRule => "EventsRule",
        ResourceKind::SnsTopic => "SNSTopic",
        ResourceKind::SqsQueue => "SQSQueue",
        ResourceKind::KinesisStream => "KinesisStream",
        ResourceKind::CloudwatchAlarm => "CloudWatchAlarm",
        ResourceKind::LambdaLayer => "LambdaLayerVersion",
        ResourceKind::Lambda => "LambdaFunction",
        ResourceKind::StepFunctions => "StepFunctionsStateMachine",
        ResourceKind::ApiGateway => "ApiGatewayRestApi",
    }
}

/// Logical id of the primary template resource for `name`
pub fn logic_name(kind: ResourceKind, name: &str) -> String {
    prefixed(kind_prefix(kind), &[name])
}
