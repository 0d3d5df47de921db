use super::{ConvertContext, ResourceConverter, meta_str};
use crate::error::{Result, TransformError};
use crate::logic_name::{logic_name, prefixed};
use crate::template::{TemplateResource, reference};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use stackwright_cloud::resource::validate_params;
use stackwright_cloud::{ResourceDescriptor, ResourceKind};

const DEFAULT_READ_CAPACITY: i64 = 1;
const DEFAULT_WRITE_CAPACITY: i64 = 1;
pub(crate) const DEFAULT_STREAM_VIEW_TYPE: &str = "NEW_AND_OLD_IMAGES";

pub struct DynamoDbTableConverter;

fn push_attribute(definitions: &mut Vec<Value>, name: &str, attr_type: &Value) {
    let exists = definitions
        .iter()
        .any(|d| d["AttributeName"].as_str() == Some(name));
    if !exists {
        definitions.push(json!({"AttributeName": name, "AttributeType": attr_type}));
    }
}

fn index_definition(table: &str, index: &Value) -> Result<Value> {
    let (Some(name), Some(key)) = (
        index.get("name").and_then(Value::as_str),
        index.get("index_key_name").and_then(Value::as_str),
    ) else {
        return Err(TransformError::invalid(
            table,
            "indexes",
            "every index needs 'name' and 'index_key_name'",
        ));
    };
    let mut schema = vec![json!({"AttributeName": key, "KeyType": "HASH"})];
    if let Some(sort) = index.get("index_sort_key_name").and_then(Value::as_str) {
        schema.push(json!({"AttributeName": sort, "KeyType": "RANGE"}));
    }
    Ok(json!({
        "IndexName": name,
        "KeySchema": schema,
        "Projection": {"ProjectionType": "ALL"}
    }))
}

/// Turn on the table stream unless it already is.
pub(crate) fn enable_stream(table: &mut TemplateResource, view_type: &str) {
    if !table.properties.contains_key("StreamSpecification") {
        table.set("StreamSpecification", json!({"StreamViewType": view_type}));
    }
}

#[async_trait]
impl ResourceConverter for DynamoDbTableConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let meta = &descriptor.meta;
        validate_params(name, meta, &["hash_key_name", "hash_key_type"])?;

        let read = meta
            .get("read_capacity")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_READ_CAPACITY);
        let write = meta
            .get("write_capacity")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_WRITE_CAPACITY);
        let throughput = json!({"ReadCapacityUnits": read, "WriteCapacityUnits": write});

        let hash_key = meta_str(descriptor, "hash_key_name")?;
        let mut schema = vec![json!({"AttributeName": hash_key, "KeyType": "HASH"})];
        let mut definitions = Vec::new();
        push_attribute(&mut definitions, hash_key, &meta["hash_key_type"]);

        if let Some(sort_key) = meta.get("sort_key_name").and_then(Value::as_str) {
            let sort_type = meta
                .get("sort_key_type")
                .ok_or_else(|| TransformError::invalid(name, "sort_key_type", "is required"))?;
            schema.push(json!({"AttributeName": sort_key, "KeyType": "RANGE"}));
            push_attribute(&mut definitions, sort_key, sort_type);
        }

        let mut table = TemplateResource::new("AWS::DynamoDB::Table").with("TableName", name);

        for (key, property, global) in [
            ("global_indexes", "GlobalSecondaryIndexes", true),
            ("local_indexes", "LocalSecondaryIndexes", false),
        ] {
            let Some(indexes) = meta.get(key).and_then(Value::as_array) else {
                continue;
            };
            let mut converted = Vec::with_capacity(indexes.len());
            for index in indexes {
                for (attr, attr_type) in [
                    ("index_key_name", "index_key_type"),
                    ("index_sort_key_name", "index_sort_key_type"),
                ] {
                    if let Some(attr_name) = index.get(attr).and_then(Value::as_str) {
                        push_attribute(&mut definitions, attr_name, &index[attr_type]);
                    }
                }
                let mut definition = index_definition(name, index)?;
                if global {
                    definition["ProvisionedThroughput"] = throughput.clone();
                }
                converted.push(definition);
            }
            table.set(property, converted);
        }

        table.set("AttributeDefinitions", definitions);
        table.set("KeySchema", schema);
        table.set("ProvisionedThroughput", throughput);
        if let Some(view_type) = meta.get("stream_view_type").and_then(Value::as_str) {
            enable_stream(&mut table, view_type);
        }

        ctx.template
            .add_resource(logic_name(ResourceKind::DynamodbTable, name), table)
    }
}

pub struct S3BucketConverter;

fn canned_acl(acl: &str) -> Option<&'static str> {
    Some(match acl {
        "private" => "Private",
        "public-read" => "PublicRead",
        "public-read-write" => "PublicReadWrite",
        "aws-exec-read" => "AwsExecRead",
        "authenticated-read" => "AuthenticatedRead",
        "bucket-owner-read" => "BucketOwnerRead",
        "bucket-owner-full-control" => "BucketOwnerFullControl",
        "log-delivery-write" => "LogDeliveryWrite",
        _ => return None,
    })
}

/// Rename API-style CORS keys to their template spelling.
fn cors_rule(bucket: &str, rule: &Map<String, Value>) -> Result<Value> {
    let mut converted = Map::new();
    for (key, value) in rule {
        let key = match key.as_str() {
            "ID" => {
                converted.insert("Id".to_string(), value.clone());
                continue;
            }
            "ExposeHeaders" => "ExposedHeaders",
            "MaxAgeSeconds" => "MaxAge",
            other => other,
        };
        let value = match value {
            Value::String(s) => json!([s]),
            Value::Array(_) | Value::Number(_) => value.clone(),
            other => {
                return Err(TransformError::invalid(
                    bucket,
                    "cors",
                    format!("attribute {} has invalid value {}", key, other),
                ));
            }
        };
        converted.insert(key.to_string(), value);
    }
    Ok(Value::Object(converted))
}

#[async_trait]
impl ResourceConverter for S3BucketConverter {
    async fn convert(
        &self,
        ctx: &mut ConvertContext<'_>,
        descriptor: &ResourceDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let meta = &descriptor.meta;
        let bucket_logic = logic_name(ResourceKind::S3Bucket, name);
        let mut bucket = TemplateResource::new("AWS::S3::Bucket").with("BucketName", name);

        if let Some(acl) = meta.get("acl").and_then(Value::as_str) {
            let acl = canned_acl(acl).ok_or_else(|| {
                TransformError::invalid(name, "acl", format!("unknown canned ACL {}", acl))
            })?;
            bucket.set("AccessControl", acl);
        }

        if let Some(rules) = meta.get("cors").and_then(Value::as_array) {
            let rules = rules
                .iter()
                .filter_map(Value::as_object)
                .map(|rule| cors_rule(name, rule))
                .collect::<Result<Vec<_>>>()?;
            bucket.set("CorsConfiguration", json!({"CorsRules": rules}));
        }

        if let Some(lifecycle) = meta.get("LifecycleConfiguration") {
            let rules: Vec<Value> = lifecycle
                .get("Rules")
                .and_then(Value::as_array)
                .map(|rules| {
                    rules
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|rule| {
                            let mut rule = rule.clone();
                            if let Some(id) = rule.remove("ID") {
                                rule.insert("Id".to_string(), id);
                            }
                            rule.entry("Prefix").or_insert_with(|| json!(""));
                            Value::Object(rule)
                        })
                        .collect()
                })
                .unwrap_or_default();
            bucket.set("LifecycleConfiguration", json!({"Rules": rules}));
        }

        ctx.template.add_resource(bucket_logic.clone(), bucket)?;

        if let Some(policy) = meta.get("policy") {
            let bucket_policy = TemplateResource::new("AWS::S3::BucketPolicy")
                .with("Bucket", reference(&bucket_logic))
                .with("PolicyDocument", policy.clone());
            ctx.template
                .add_resource(prefixed("S3BucketPolicy", &[name]), bucket_policy)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::TransformSettings;
    use crate::template::Template;

    fn descriptor(name: &str, kind: ResourceKind, meta: Value) -> ResourceDescriptor {
        ResourceDescriptor::new(name, kind, meta.as_object().cloned().unwrap())
    }

    #[tokio::test]
    async fn test_table_with_indexes() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);

        DynamoDbTableConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "orders",
                    ResourceKind::DynamodbTable,
                    json!({
                        "hash_key_name": "id",
                        "hash_key_type": "S",
                        "sort_key_name": "created",
                        "sort_key_type": "N",
                        "read_capacity": 5,
                        "global_indexes": [
                            {"name": "by-customer", "index_key_name": "customer", "index_key_type": "S"},
                            {"name": "by-id", "index_key_name": "id", "index_key_type": "S"}
                        ],
                        "stream_view_type": "KEYS_ONLY"
                    }),
                ),
            )
            .await
            .unwrap();

        let table = template.get("DynamoDBTableOrders").unwrap();
        assert_eq!(
            table.properties["AttributeDefinitions"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
        assert_eq!(
            table.properties["ProvisionedThroughput"],
            json!({"ReadCapacityUnits": 5, "WriteCapacityUnits": 1})
        );
        assert_eq!(
            table.properties["GlobalSecondaryIndexes"][0]["ProvisionedThroughput"]["ReadCapacityUnits"],
            json!(5)
        );
        assert_eq!(
            table.properties["StreamSpecification"],
            json!({"StreamViewType": "KEYS_ONLY"})
        );
    }

    #[tokio::test]
    async fn test_table_requires_sort_key_type() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);
        let result = DynamoDbTableConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "orders",
                    ResourceKind::DynamodbTable,
                    json!({"hash_key_name": "id", "hash_key_type": "S", "sort_key_name": "ts"}),
                ),
            )
            .await;
        assert!(matches!(result, Err(TransformError::InvalidParameter { .. })));
    }

    #[tokio::test]
    async fn test_bucket_acl_cors_and_policy() {
        let mut template = Template::new();
        let settings = TransformSettings::new("eu-west-1", "123456789012");
        let mut ctx = ConvertContext::new(&mut template, &settings, None);

        S3BucketConverter
            .convert(
                &mut ctx,
                &descriptor(
                    "assets",
                    ResourceKind::S3Bucket,
                    json!({
                        "acl": "public-read",
                        "cors": [{"ID": "web", "AllowedMethods": "GET", "MaxAgeSeconds": 300}],
                        "policy": {"Version": "2012-10-17", "Statement": []}
                    }),
                ),
            )
            .await
            .unwrap();

        let bucket = template.get("S3BucketAssets").unwrap();
        assert_eq!(bucket.properties["AccessControl"], json!("PublicRead"));
        assert_eq!(
            bucket.properties["CorsConfiguration"]["CorsRules"][0],
            json!({"Id": "web", "AllowedMethods": ["GET"], "MaxAge": 300})
        );
        assert_eq!(
            template.get("S3BucketPolicyAssets").unwrap().properties["Bucket"],
            json!({"Ref": "S3BucketAssets"})
        );
    }
}
