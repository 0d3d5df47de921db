//! File-backed resource store
//!
//! Every resource is a JSON record at `<root>/<region>/<kind>/<name>.json`.
//! Global kinds live under `<root>/global/`.

use crate::error::{LocalError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stackwright_cloud::ResourceKind;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;

const GLOBAL_DIR: &str = "global";
pub const DEFAULT_ACCOUNT_ID: &str = "000000000000";

/// Write `content` to a temp file next to `path`, then move it into place.
/// Readers never see a partial record. Without `overwrite` an existing
/// record wins and the call fails with `AlreadyExists`.
async fn publish(path: PathBuf, content: String, overwrite: bool) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .ok_or_else(|| std::io::Error::other(format!("{} has no parent", path.display())))?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        let persisted = if overwrite {
            file.persist(&path)
        } else {
            file.persist_noclobber(&path)
        };
        persisted.map(|_| ()).map_err(|e| e.error)
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Stored resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,
    pub kind: ResourceKind,
    pub region: String,
    pub arn: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub meta: Map<String, Value>,

    /// Event sources attached to a function
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Value>,
}

impl ResourceRecord {
    pub fn describe(&self) -> Value {
        serde_json::json!({
            "Arn": self.arn,
            "Name": self.name,
            "Region": self.region,
            "CreatedAt": self.created_at.to_rfc3339(),
            "UpdatedAt": self.updated_at.to_rfc3339(),
            "Triggers": self.triggers,
        })
    }
}

/// Local stand-in for a cloud account
#[derive(Debug, Clone)]
pub struct LocalCloud {
    root: PathBuf,
    account_id: String,
}

impl LocalCloud {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    fn kind_dir(&self, kind: ResourceKind, region: &str) -> PathBuf {
        let scope = if kind.is_global() { GLOBAL_DIR } else { region };
        self.root.join(scope).join(kind.as_str())
    }

    fn record_path(&self, kind: ResourceKind, region: &str, name: &str) -> PathBuf {
        self.kind_dir(kind, region).join(format!("{}.json", name))
    }

    /// Provider identifier for a resource
    pub fn arn(&self, kind: ResourceKind, region: &str, name: &str) -> String {
        let account = &self.account_id;
        match kind {
            ResourceKind::IamPolicy => format!("arn:aws:iam::{}:policy/{}", account, name),
            ResourceKind::IamRole => format!("arn:aws:iam::{}:role/{}", account, name),
            ResourceKind::S3Bucket => format!("arn:aws:s3:::{}", name),
            ResourceKind::DynamodbTable => {
                format!("arn:aws:dynamodb:{}:{}:table/{}", region, account, name)
            }
            ResourceKind::CloudwatchRule | ResourceKind::EventbridgeRule => {
                format!("arn:aws:events:{}:{}:rule/{}", region, account, name)
            }
            ResourceKind::SnsTopic => format!("arn:aws:sns:{}:{}:{}", region, account, name),
            ResourceKind::SqsQueue => format!("arn:aws:sqs:{}:{}:{}", region, account, name),
            ResourceKind::KinesisStream => {
                format!("arn:aws:kinesis:{}:{}:stream/{}", region, account, name)
            }
            ResourceKind::CloudwatchAlarm => {
                format!("arn:aws:cloudwatch:{}:{}:alarm:{}", region, account, name)
            }
            ResourceKind::LambdaLayer => {
                format!("arn:aws:lambda:{}:{}:layer:{}", region, account, name)
            }
            ResourceKind::Lambda => {
                format!("arn:aws:lambda:{}:{}:function:{}", region, account, name)
            }
            ResourceKind::StepFunctions => {
                format!("arn:aws:states:{}:{}:stateMachine:{}", region, account, name)
            }
            ResourceKind::ApiGateway => format!("arn:aws:apigateway:{}::/restapis/{}", region, name),
        }
    }

    pub async fn get(
        &self,
        kind: ResourceKind,
        region: &str,
        name: &str,
    ) -> Result<Option<ResourceRecord>> {
        let path = self.record_path(kind, region, name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&content).map_err(|e| LocalError::InvalidRecord {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(record))
    }

    /// Store a new record; fails when one with the same name exists.
    pub async fn insert(
        &self,
        kind: ResourceKind,
        region: &str,
        name: &str,
        meta: Map<String, Value>,
    ) -> Result<ResourceRecord> {
        fs::create_dir_all(self.kind_dir(kind, region)).await?;

        let now = Utc::now();
        let record = ResourceRecord {
            name: name.to_string(),
            kind,
            region: region.to_string(),
            arn: self.arn(kind, region, name),
            created_at: now,
            updated_at: now,
            meta,
            triggers: Vec::new(),
        };

        let path = self.record_path(kind, region, name);
        let content = serde_json::to_string_pretty(&record)?;
        match publish(path.clone(), content, false).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(LocalError::AlreadyExists {
                    kind,
                    name: name.to_string(),
                    region: region.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::debug!("Stored {} at {}", record.arn, path.display());
        Ok(record)
    }

    /// Overwrite an existing record.
    pub async fn replace(&self, record: &ResourceRecord) -> Result<()> {
        let path = self.record_path(record.kind, &record.region, &record.name);
        if !path.exists() {
            return Err(LocalError::NotFound {
                kind: record.kind,
                name: record.name.clone(),
                region: record.region.clone(),
            });
        }
        publish(path, serde_json::to_string_pretty(record)?, true).await?;
        Ok(())
    }

    pub async fn delete(&self, kind: ResourceKind, region: &str, name: &str) -> Result<()> {
        match fs::remove_file(self.record_path(kind, region, name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(LocalError::NotFound {
                kind,
                name: name.to_string(),
                region: region.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of all records of `kind` in `region`, sorted
    pub async fn list(&self, kind: ResourceKind, region: &str) -> Result<Vec<String>> {
        let dir = self.kind_dir(kind, region);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}
