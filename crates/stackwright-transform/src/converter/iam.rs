use super::{ConvertContext, ResourceConverter, string_list};
use crate::error::Result;
use crate::logic_name::{logic_name, prefixed};
use crate::template::{TemplateResource, reference};
use async_trait::async_trait;
use serde_json::{Value, json};
use stackwright_cloud::resource::validate_params;
use stackwright_cloud::{ResourceDescriptor, ResourceKind};

const AWS_MANAGED_POLICY_PREFIX: &str = "arn:aws:iam::aws:policy/";

pub struct IamPolicyConverter;

#[async_trait]
impl ResourceConverter for IamPolicyConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        validate_params(&descriptor.name, &descriptor.meta, &["policy_content"])?;
        let policy = TemplateResource::new("AWS::IAM::ManagedPolicy")
            .with("ManagedPolicyName", descriptor.name.as_str())
            .with("PolicyDocument", descriptor.meta["policy_content"].clone());
        ctx.template
            .add_resource(logic_name(ResourceKind::IamPolicy, &descriptor.name), policy)
    }
}

pub struct IamRoleConverter;

impl IamRoleConverter {
    fn assume_role_policy(descriptor: &ResourceDescriptor) -> Value {
        let meta = &descriptor.meta;
        let mut document = meta
            .get("trusted_relationships")
            .filter(|doc| doc.is_object())
            .cloned()
            .unwrap_or_else(|| json!({"Version": "2012-10-17", "Statement": []}));

        let mut statements = Vec::new();
        let accounts = string_list(meta.get("allowed_accounts"));
        if !accounts.is_empty() {
            let principals: Vec<String> = accounts
                .iter()
                .map(|account| format!("arn:aws:iam::{}:root", account))
                .collect();
            let mut statement = json!({
                "Effect": "Allow",
                "Principal": {"AWS": principals},
                "Action": "sts:AssumeRole"
            });
            if let Some(external_id) = meta.get("external_id").and_then(Value::as_str) {
                statement["Condition"] = json!({"StringEquals": {"sts:ExternalId": external_id}});
            }
            statements.push(statement);
        }
        let services = string_list(meta.get("principal_service"));
        if !services.is_empty() {
            let services: Vec<String> = services
                .iter()
                .map(|service| format!("{}.amazonaws.com", service))
                .collect();
            statements.push(json!({
                "Effect": "Allow",
                "Principal": {"Service": services},
                "Action": "sts:AssumeRole"
            }));
        }

        if !statements.is_empty() {
            match document.get_mut("Statement") {
                Some(Value::Array(existing)) => existing.extend(statements),
                _ => document["Statement"] = Value::Array(statements),
            }
        }
        document
    }

    async fn policy_arns(
        ctx: &ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
        role: &mut TemplateResource,
    ) -> Result<Vec<Value>> {
        let mut arns: Vec<Value> = string_list(descriptor.meta.get("predefined_policies"))
            .into_iter()
            .map(|policy| Value::String(format!("{}{}", AWS_MANAGED_POLICY_PREFIX, policy)))
            .collect();

        for policy in string_list(descriptor.meta.get("custom_policies")) {
            if let Some(logic) = ctx.find(ResourceKind::IamPolicy, &policy) {
                arns.push(reference(&logic));
                role.depends_on(logic);
                continue;
            }
            let arn = match ctx.identify(ResourceKind::IamPolicy, &policy).await? {
                Some(arn) => arn,
                None => {
                    tracing::warn!(
                        "Policy '{}' of role {} is not in the template, building its ARN",
                        policy,
                        descriptor.name
                    );
                    ctx.settings.policy_arn(&policy)
                }
            };
            arns.push(Value::String(arn));
        }
        Ok(arns)
    }
}

#[async_trait]
impl ResourceConverter for IamRoleConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let role_logic = logic_name(ResourceKind::IamRole, &descriptor.name);
        let mut role = TemplateResource::new("AWS::IAM::Role")
            .with("RoleName", descriptor.name.as_str())
            .with(
                "AssumeRolePolicyDocument",
                Self::assume_role_policy(descriptor),
            );
        let arns = Self::policy_arns(ctx, descriptor, &mut role).await?;
        role.set("ManagedPolicyArns", arns);
        ctx.template.add_resource(role_logic.clone(), role)?;

        let instance_profile = match descriptor.meta.get("instance_profile") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag.eq_ignore_ascii_case("true"),
            _ => false,
        };
        if instance_profile {
            let profile = TemplateResource::new("AWS::IAM::InstanceProfile")
                .with("InstanceProfileName", descriptor.name.as_str())
                .with("Roles", json!([reference(&role_logic)]));
            ctx.template.add_resource(
                prefixed("IAMInstanceProfile", &[&descriptor.name]),
                profile,
            )?;
        }
        Ok(())
    }
}

/// Inline policy attached to a role (used by stream triggers)
pub(crate) fn inline_policy(policy_name: &str, role: Value, document: Value) -> TemplateResource {
    TemplateResource::new("AWS::IAM::Policy")
        .with("PolicyName", policy_name)
        .with("PolicyDocument", document)
        .with("Roles", json!([role]))
}
