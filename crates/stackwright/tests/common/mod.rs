#![allow(deprecated)]

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const RESOURCES: &str = r#"{
  "exec": {"resource_type": "iam_role", "principal_service": "lambda"},
  "jobs": {"resource_type": "sqs_queue"},
  "worker": {
    "resource_type": "lambda",
    "iam_role_name": "exec",
    "runtime": "python3.12",
    "event_sources": [
      {"resource_type": "sqs_trigger", "target_queue": "jobs", "batch_size": 10}
    ]
  }
}"#;

/// Project directory isolated from the user's config
pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("stackwright.yaml"), content).unwrap();
    }

    pub fn write_resources(&self, dir: &str, content: &str) {
        let dir = self.root.path().join(dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("deployment_resources.json"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn file(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.path().join(relative)
    }

    /// `stackwright` running inside the project
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("stackwright").unwrap();
        cmd.current_dir(self.root.path())
            .env_remove("STACKWRIGHT_CONFIG")
            .env_remove("RUST_LOG")
            .env("HOME", self.root.path())
            .env("XDG_CONFIG_HOME", self.root.path().join(".config"));
        cmd
    }
}
