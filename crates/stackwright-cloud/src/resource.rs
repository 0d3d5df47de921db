//! Resource model: kinds, descriptors, region directives and jobs

use crate::error::{CloudError, ProviderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// Meta key holding the region directive
pub const REGION_KEY: &str = "region";
/// Meta key holding the resource type
pub const RESOURCE_TYPE_KEY: &str = "resource_type";

/// Kind of provisionable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    IamPolicy,
    IamRole,
    DynamodbTable,
    S3Bucket,
    CloudwatchRule,
    EventbridgeRule,
    SnsTopic,
    SqsQueue,
    KinesisStream,
    CloudwatchAlarm,
    LambdaLayer,
    Lambda,
    StepFunctions,
    ApiGateway,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 14] = [
        ResourceKind::IamPolicy,
        ResourceKind::IamRole,
        ResourceKind::DynamodbTable,
        ResourceKind::S3Bucket,
        ResourceKind::CloudwatchRule,
        ResourceKind::EventbridgeRule,
        ResourceKind::SnsTopic,
        ResourceKind::SqsQueue,
        ResourceKind::KinesisStream,
        ResourceKind::CloudwatchAlarm,
        ResourceKind::LambdaLayer,
        ResourceKind::Lambda,
        ResourceKind::StepFunctions,
        ResourceKind::ApiGateway,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::IamPolicy => "iam_policy",
            ResourceKind::IamRole => "iam_role",
            ResourceKind::DynamodbTable => "dynamodb_table",
            ResourceKind::S3Bucket => "s3_bucket",
            ResourceKind::CloudwatchRule => "cloudwatch_rule",
            ResourceKind::EventbridgeRule => "eventbridge_rule",
            ResourceKind::SnsTopic => "sns_topic",
            ResourceKind::SqsQueue => "sqs_queue",
            ResourceKind::KinesisStream => "kinesis_stream",
            ResourceKind::CloudwatchAlarm => "cloudwatch_alarm",
            ResourceKind::LambdaLayer => "lambda_layer",
            ResourceKind::Lambda => "lambda",
            ResourceKind::StepFunctions => "step_functions",
            ResourceKind::ApiGateway => "api_gateway",
        }
    }

    /// Global kinds live outside any region and always resolve to a single job.
    pub fn is_global(&self) -> bool {
        matches!(
            self,
            ResourceKind::IamPolicy | ResourceKind::IamRole | ResourceKind::S3Bucket
        )
    }

    /// Priority in a deploy run (lower runs first)
    pub fn deploy_priority(&self) -> u8 {
        match self {
            ResourceKind::IamPolicy => 1,
            ResourceKind::IamRole => 2,
            ResourceKind::DynamodbTable => 3,
            ResourceKind::S3Bucket => 5,
            ResourceKind::CloudwatchRule | ResourceKind::EventbridgeRule => 6,
            ResourceKind::SnsTopic => 7,
            ResourceKind::SqsQueue => 8,
            ResourceKind::KinesisStream => 9,
            ResourceKind::CloudwatchAlarm => 10,
            ResourceKind::LambdaLayer => 11,
            ResourceKind::Lambda => 12,
            ResourceKind::StepFunctions => 14,
            ResourceKind::ApiGateway => 16,
        }
    }

    /// Priority in a clean run (lower runs first)
    pub fn clean_priority(&self) -> u8 {
        match self {
            ResourceKind::IamRole => 1,
            ResourceKind::IamPolicy => 2,
            ResourceKind::DynamodbTable => 4,
            ResourceKind::S3Bucket => 5,
            ResourceKind::CloudwatchRule | ResourceKind::EventbridgeRule => 6,
            ResourceKind::SnsTopic => 7,
            ResourceKind::SqsQueue => 8,
            ResourceKind::KinesisStream => 9,
            ResourceKind::CloudwatchAlarm => 10,
            ResourceKind::Lambda => 11,
            ResourceKind::LambdaLayer => 12,
            ResourceKind::StepFunctions => 14,
            ResourceKind::ApiGateway => 17,
        }
    }

    /// Priority in an update run. `None` means the kind can't be updated in place.
    pub fn update_priority(&self) -> Option<u8> {
        match self {
            ResourceKind::IamPolicy => Some(1),
            ResourceKind::IamRole => Some(2),
            ResourceKind::DynamodbTable => Some(3),
            ResourceKind::LambdaLayer => Some(4),
            ResourceKind::Lambda => Some(5),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CloudError::UnsupportedResourceType(s.to_string()))
    }
}

/// Direction of a run through the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Create,
    Update,
    Remove,
}

impl Direction {
    /// Kinds in the order this direction processes them.
    ///
    /// Kinds sharing a priority keep their declaration order.
    pub fn order(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<(u8, ResourceKind)> = ResourceKind::ALL
            .iter()
            .filter_map(|kind| {
                let priority = match self {
                    Direction::Create => Some(kind.deploy_priority()),
                    Direction::Remove => Some(kind.clean_priority()),
                    Direction::Update => kind.update_priority(),
                };
                priority.map(|p| (p, *kind))
            })
            .collect();
        kinds.sort_by_key(|(priority, _)| *priority);
        kinds.into_iter().map(|(_, kind)| kind).collect()
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Create => write!(f, "create"),
            Direction::Update => write!(f, "update"),
            Direction::Remove => write!(f, "remove"),
        }
    }
}

/// Region directive of a resource
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RegionSpec {
    /// Use the project default region
    #[default]
    Default,
    /// Every available region
    All,
    Single(String),
    List(Vec<String>),
    /// Any other value shape; rejected during resolution
    Invalid(Value),
}

impl RegionSpec {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => RegionSpec::Default,
            Some(Value::String(s)) if s == "all" => RegionSpec::All,
            Some(Value::String(s)) => RegionSpec::Single(s.clone()),
            Some(Value::Array(items)) => {
                let regions: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                match regions {
                    Some(regions) => RegionSpec::List(regions),
                    None => RegionSpec::Invalid(Value::Array(items.clone())),
                }
            }
            Some(other) => RegionSpec::Invalid(other.clone()),
        }
    }
}

/// A declared resource, as read from the deployment resources document
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDescriptor {
    pub name: String,
    pub kind: ResourceKind,
    pub meta: Map<String, Value>,
    pub region: RegionSpec,
}

impl ResourceDescriptor {
    pub fn new(name: impl Into<String>, kind: ResourceKind, meta: Map<String, Value>) -> Self {
        let region = RegionSpec::from_value(meta.get(REGION_KEY));
        Self {
            name: name.into(),
            kind,
            meta,
            region,
        }
    }

    /// Build a descriptor from its meta object, which carries `resource_type`.
    pub fn from_meta(name: impl Into<String>, meta: Value) -> Result<Self> {
        let name = name.into();
        let Value::Object(meta) = meta else {
            return Err(CloudError::InvalidResource {
                name,
                reason: "resource definition must be an object".to_string(),
            });
        };
        let kind = meta
            .get(RESOURCE_TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::InvalidResource {
                name: name.clone(),
                reason: format!("'{}' is missing", RESOURCE_TYPE_KEY),
            })?
            .parse::<ResourceKind>()?;
        Ok(Self::new(name, kind, meta))
    }

    pub fn with_region(mut self, region: RegionSpec) -> Self {
        self.region = region;
        self
    }

    /// Names of the resources this one declares as dependencies
    pub fn dependencies(&self) -> Vec<&str> {
        self.meta
            .get("dependencies")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(|dep| dep.get("resource_name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Parse a deployment resources document (`{name: {resource_type, ...}}`).
pub fn descriptors_from_document(document: Value) -> Result<Vec<ResourceDescriptor>> {
    let Value::Object(resources) = document else {
        return Err(CloudError::InvalidConfig(
            "deployment resources document must be an object".to_string(),
        ));
    };
    resources
        .into_iter()
        .map(|(name, meta)| ResourceDescriptor::from_meta(name, meta))
        .collect()
}

/// Apply a name prefix/suffix to every descriptor, rewriting references to
/// the old names inside other descriptors' meta.
pub fn resolve_names(
    descriptors: &mut [ResourceDescriptor],
    prefix: Option<&str>,
    suffix: Option<&str>,
) {
    let prefix = prefix.unwrap_or_default();
    let suffix = suffix.unwrap_or_default();
    if prefix.is_empty() && suffix.is_empty() {
        return;
    }

    let renames: HashMap<String, String> = descriptors
        .iter()
        .map(|d| (d.name.clone(), format!("{}{}{}", prefix, d.name, suffix)))
        .collect();

    for descriptor in descriptors.iter_mut() {
        if let Some(new) = renames.get(&descriptor.name) {
            descriptor.name = new.clone();
        }
        rename_references(&mut descriptor.meta, &renames);
    }
}

fn rename_references(meta: &mut Map<String, Value>, renames: &HashMap<String, String>) {
    for value in meta.values_mut() {
        rename_in_value(value, renames);
    }
}

fn rename_in_value(value: &mut Value, renames: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            if let Some(new) = renames.get(s.as_str()) {
                *s = new.clone();
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| rename_in_value(item, renames)),
        Value::Object(map) => rename_references(map, renames),
        _ => {}
    }
}

/// Include/exclude selection of resources by name and type.
///
/// With no include lists everything is selected; excludes are applied after
/// includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub only_names: HashSet<String>,
    pub only_types: HashSet<ResourceKind>,
    pub excluded_names: HashSet<String>,
    pub excluded_types: HashSet<ResourceKind>,
}

impl ResourceFilter {
    pub fn is_empty(&self) -> bool {
        self.only_names.is_empty()
            && self.only_types.is_empty()
            && self.excluded_names.is_empty()
            && self.excluded_types.is_empty()
    }

    /// Let every name also match its prefixed/suffixed form, so names can
    /// be given the way they are declared.
    pub fn with_name_affixes(mut self, prefix: Option<&str>, suffix: Option<&str>) -> Self {
        let prefix = prefix.unwrap_or_default();
        let suffix = suffix.unwrap_or_default();
        if prefix.is_empty() && suffix.is_empty() {
            return self;
        }
        let widen = |names: &mut HashSet<String>| {
            let resolved: Vec<String> = names
                .iter()
                .map(|name| format!("{}{}{}", prefix, name, suffix))
                .collect();
            names.extend(resolved);
        };
        widen(&mut self.only_names);
        widen(&mut self.excluded_names);
        self
    }

    pub fn matches(&self, name: &str, kind: ResourceKind) -> bool {
        let included = (self.only_names.is_empty() && self.only_types.is_empty())
            || self.only_names.contains(name)
            || self.only_types.contains(&kind);
        included && !self.excluded_names.contains(name) && !self.excluded_types.contains(&kind)
    }

    pub fn apply(&self, descriptors: &[ResourceDescriptor]) -> Vec<ResourceDescriptor> {
        let selected: Vec<ResourceDescriptor> = descriptors
            .iter()
            .filter(|d| self.matches(&d.name, d.kind))
            .cloned()
            .collect();
        if !self.is_empty() {
            tracing::debug!(
                "Filter selected {} of {} resources",
                selected.len(),
                descriptors.len()
            );
        }
        selected
    }

    pub fn apply_jobs(&self, jobs: Vec<ResourceJob>) -> Vec<ResourceJob> {
        jobs.into_iter()
            .filter(|job| self.matches(&job.name, job.kind))
            .collect()
    }
}

/// Replace `#{name}` aliases in string values with a resolved identifier.
pub fn substitute_alias(meta: &mut Map<String, Value>, name: &str, identifier: &str) {
    let alias = format!("#{{{}}}", name);
    for value in meta.values_mut() {
        substitute_in_value(value, &alias, identifier);
    }
}

fn substitute_in_value(value: &mut Value, alias: &str, identifier: &str) {
    match value {
        Value::String(s) if s.contains(alias) => *s = s.replace(alias, identifier),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| substitute_in_value(item, alias, identifier)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| substitute_in_value(item, alias, identifier)),
        _ => {}
    }
}

/// Resolved unit of work: one resource in one region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceJob {
    pub name: String,
    pub kind: ResourceKind,
    pub meta: Map<String, Value>,
    pub region: String,
}

impl ResourceJob {
    /// `kind:name:region`, the key deploy outputs are stored under
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.name, self.region)
    }

    pub fn get_meta<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.meta
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Fail with a validation error unless every key is present in meta.
    pub fn require_params(&self, required: &[&str]) -> std::result::Result<(), ProviderError> {
        validate_params(&self.name, &self.meta, required)
    }
}

pub fn validate_params(
    name: &str,
    meta: &Map<String, Value>,
    required: &[&str],
) -> std::result::Result<(), ProviderError> {
    let missing: Vec<String> = required
        .iter()
        .filter(|key| !meta.contains_key(**key))
        .map(|key| key.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ProviderError::MissingParameters {
            name: name.to_string(),
            missing,
        })
    }
}

/// What a create/update call reports back about a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub resource_name: String,
    pub resource_type: ResourceKind,
    pub region: String,

    /// Provider-assigned identifier (ARN, id) when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// True when the resource was found rather than created by this call
    #[serde(default)]
    pub existed: bool,

    pub resource_meta: Map<String, Value>,

    /// Raw provider description
    #[serde(default)]
    pub description: Value,
}

impl Description {
    pub fn new(job: &ResourceJob, description: Value) -> Self {
        Self {
            resource_name: job.name.clone(),
            resource_type: job.kind,
            region: job.region.clone(),
            identifier: None,
            existed: false,
            resource_meta: job.meta.clone(),
            description,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn existing(mut self) -> Self {
        self.existed = true;
        self
    }

    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.resource_type, self.resource_name, self.region)
    }

    /// Rebuild the job this description came from (used by clean).
    pub fn to_job(&self) -> ResourceJob {
        ResourceJob {
            name: self.resource_name.clone(),
            kind: self.resource_type,
            meta: self.resource_meta.clone(),
            region: self.region.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trip_through_strings() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
        assert!(matches!(
            "queue".parse::<ResourceKind>(),
            Err(CloudError::UnsupportedResourceType(t)) if t == "queue"
        ));
    }

    #[test]
    fn test_deploy_order_puts_identity_first() {
        let order = Direction::Create.order();
        assert_eq!(order[0], ResourceKind::IamPolicy);
        assert_eq!(order[1], ResourceKind::IamRole);
        let lambda = order.iter().position(|k| *k == ResourceKind::Lambda).unwrap();
        let layer = order.iter().position(|k| *k == ResourceKind::LambdaLayer).unwrap();
        assert!(layer < lambda);
        assert_eq!(order.len(), ResourceKind::ALL.len());
    }

    #[test]
    fn test_clean_order_removes_roles_before_policies() {
        let order = Direction::Remove.order();
        assert_eq!(&order[..2], &[ResourceKind::IamRole, ResourceKind::IamPolicy]);
        let lambda = order.iter().position(|k| *k == ResourceKind::Lambda).unwrap();
        let layer = order.iter().position(|k| *k == ResourceKind::LambdaLayer).unwrap();
        assert!(lambda < layer);
    }

    #[test]
    fn test_update_order_is_a_subset() {
        assert_eq!(
            Direction::Update.order(),
            vec![
                ResourceKind::IamPolicy,
                ResourceKind::IamRole,
                ResourceKind::DynamodbTable,
                ResourceKind::LambdaLayer,
                ResourceKind::Lambda,
            ]
        );
    }

    #[test]
    fn test_region_spec_shapes() {
        assert_eq!(RegionSpec::from_value(None), RegionSpec::Default);
        assert_eq!(RegionSpec::from_value(Some(&json!("all"))), RegionSpec::All);
        assert_eq!(
            RegionSpec::from_value(Some(&json!("eu-west-1"))),
            RegionSpec::Single("eu-west-1".into())
        );
        assert_eq!(
            RegionSpec::from_value(Some(&json!(["eu-west-1", "us-east-1"]))),
            RegionSpec::List(vec!["eu-west-1".into(), "us-east-1".into()])
        );
        assert!(matches!(
            RegionSpec::from_value(Some(&json!(42))),
            RegionSpec::Invalid(_)
        ));
        assert!(matches!(
            RegionSpec::from_value(Some(&json!(["eu-west-1", 1]))),
            RegionSpec::Invalid(_)
        ));
    }

    #[test]
    fn test_descriptors_from_document() {
        let doc = json!({
            "orders-table": {"resource_type": "dynamodb_table", "region": "all"},
            "notify": {"resource_type": "sns_topic"}
        });
        let descriptors = descriptors_from_document(doc).unwrap();
        assert_eq!(descriptors.len(), 2);
        let table = descriptors.iter().find(|d| d.name == "orders-table").unwrap();
        assert_eq!(table.kind, ResourceKind::DynamodbTable);
        assert_eq!(table.region, RegionSpec::All);

        let bad = json!({"x": {"resource_type": "mainframe"}});
        assert!(descriptors_from_document(bad).is_err());
        let missing = json!({"x": {"region": "all"}});
        assert!(matches!(
            descriptors_from_document(missing),
            Err(CloudError::InvalidResource { .. })
        ));
    }

    #[test]
    fn test_resolve_names_rewrites_references() {
        let mut descriptors = vec![
            ResourceDescriptor::from_meta("exec-role", json!({"resource_type": "iam_role"}))
                .unwrap(),
            ResourceDescriptor::from_meta(
                "handler",
                json!({"resource_type": "lambda", "iam_role_name": "exec-role"}),
            )
            .unwrap(),
        ];
        resolve_names(&mut descriptors, Some("dev-"), Some("-v2"));
        assert_eq!(descriptors[0].name, "dev-exec-role-v2");
        assert_eq!(descriptors[1].name, "dev-handler-v2");
        assert_eq!(descriptors[1].meta["iam_role_name"], json!("dev-exec-role-v2"));
    }

    #[test]
    fn test_resolve_names_renames_each_name_once() {
        let mut descriptors = descriptors_from_document(json!({
            "orders": {"resource_type": "sqs_queue"},
            "orders-v2": {"resource_type": "sqs_queue"},
            "worker": {"resource_type": "lambda", "target_queue": "orders"}
        }))
        .unwrap();
        resolve_names(&mut descriptors, None, Some("-v2"));

        let mut names: Vec<&str> = descriptors.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["orders-v2", "orders-v2-v2", "worker-v2"]);

        let worker = descriptors.iter().find(|d| d.name == "worker-v2").unwrap();
        assert_eq!(worker.meta["target_queue"], json!("orders-v2"));
    }

    #[test]
    fn test_filter_includes_then_excludes() {
        let descriptors = descriptors_from_document(json!({
            "exec": {"resource_type": "iam_role"},
            "jobs": {"resource_type": "sqs_queue"},
            "events": {"resource_type": "sqs_queue"},
            "worker": {"resource_type": "lambda"}
        }))
        .unwrap();
        let names = |filter: &ResourceFilter| {
            let mut names: Vec<String> =
                filter.apply(&descriptors).into_iter().map(|d| d.name).collect();
            names.sort();
            names
        };

        let everything = ResourceFilter::default();
        assert!(everything.is_empty());
        assert_eq!(names(&everything).len(), 4);

        let filter = ResourceFilter {
            only_names: HashSet::from(["worker".to_string()]),
            only_types: HashSet::from([ResourceKind::SqsQueue]),
            excluded_names: HashSet::from(["events".to_string()]),
            ..Default::default()
        };
        assert_eq!(names(&filter), vec!["jobs", "worker"]);

        let filter = ResourceFilter {
            excluded_types: HashSet::from([ResourceKind::IamRole, ResourceKind::Lambda]),
            ..Default::default()
        };
        assert_eq!(names(&filter), vec!["events", "jobs"]);
    }

    #[test]
    fn test_filter_matches_affixed_names() {
        let filter = ResourceFilter {
            only_names: HashSet::from(["jobs".to_string()]),
            ..Default::default()
        }
        .with_name_affixes(Some("dev-"), None);
        assert!(filter.matches("jobs", ResourceKind::SqsQueue));
        assert!(filter.matches("dev-jobs", ResourceKind::SqsQueue));
        assert!(!filter.matches("dev-events", ResourceKind::SqsQueue));
    }

    #[test]
    fn test_substitute_alias() {
        let mut meta = json!({
            "target": "#{api}/prod",
            "nested": {"list": ["#{api}", "other"]}
        })
        .as_object()
        .cloned()
        .unwrap();
        substitute_alias(&mut meta, "api", "a1b2c3");
        assert_eq!(meta["target"], json!("a1b2c3/prod"));
        assert_eq!(meta["nested"]["list"][0], json!("a1b2c3"));
        assert_eq!(meta["nested"]["list"][1], json!("other"));
    }

    #[test]
    fn test_validate_params() {
        let meta = json!({"runtime": "python3.12"}).as_object().cloned().unwrap();
        assert!(validate_params("fn", &meta, &["runtime"]).is_ok());
        let err = validate_params("fn", &meta, &["runtime", "iam_role_name"]).unwrap_err();
        assert_eq!(
            err,
            ProviderError::MissingParameters {
                name: "fn".into(),
                missing: vec!["iam_role_name".into()]
            }
        );
    }
}
