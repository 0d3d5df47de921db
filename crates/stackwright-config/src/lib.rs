pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at a config file
pub const CONFIG_ENV: &str = "STACKWRIGHT_CONFIG";
const CONFIG_CANDIDATES: [&str; 2] = ["stackwright.local.yaml", "stackwright.yaml"];
const CONFIG_DIR: &str = ".stackwright";

pub const DEFAULT_CONCURRENCY: usize = 5;
const MAX_AFFIX_LEN: usize = 5;
const MAX_EXTENDED_PREFIX_LEN: usize = 14;

/// Backoff schedule for provider calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub start: u32,
    pub step: u32,
    pub count: u32,
    /// Length of one schedule unit in milliseconds
    pub unit_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            start: 1,
            step: 3,
            count: 3,
            unit_ms: 1000,
        }
    }
}

/// Contents of `stackwright.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackwrightConfig {
    /// Project root; relative paths resolve against the config file
    #[serde(default)]
    pub project_path: Option<PathBuf>,

    /// Default region
    pub region: String,

    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub deploy_target_bucket: Option<String>,

    /// Regions resources may target; the provider's full list when unset
    #[serde(default)]
    pub available_regions: Option<Vec<String>>,

    #[serde(default)]
    pub resources_prefix: Option<String>,

    #[serde(default)]
    pub resources_suffix: Option<String>,

    /// Allow prefixes up to 14 lowercase characters
    #[serde(default)]
    pub extended_prefix_mode: bool,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub retry: RetrySettings,

    /// Shared copy of the project state
    #[serde(default)]
    pub remote_state_path: Option<PathBuf>,

    /// Where build bundles and templates are written
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Storage of the local provider
    #[serde(default)]
    pub local_cloud_path: Option<PathBuf>,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

impl StackwrightConfig {
    /// Minimal config for `region`
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            project_path: None,
            region: region.into(),
            account_id: None,
            deploy_target_bucket: None,
            available_regions: None,
            resources_prefix: None,
            resources_suffix: None,
            extended_prefix_mode: false,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetrySettings::default(),
            remote_state_path: None,
            output_dir: None,
            local_cloud_path: None,
        }
    }

    /// Read, resolve relative paths and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: StackwrightConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        config.validate()?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Discover the config file and load it.
    pub fn discover() -> Result<Self> {
        Self::load(find_config_file()?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let project = match self.project_path.take() {
            Some(p) if p.is_relative() => base.join(p),
            Some(p) => p,
            None => base.to_path_buf(),
        };
        for path in [
            &mut self.remote_state_path,
            &mut self.output_dir,
            &mut self.local_cloud_path,
        ] {
            if let Some(p) = path.as_mut() {
                if p.is_relative() {
                    *p = project.join(&*p);
                }
            }
        }
        self.project_path = Some(project);
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.region.trim().is_empty() {
            errors.push("'region' must not be empty".to_string());
        }
        if let Some(available) = &self.available_regions {
            if available.is_empty() {
                errors.push("'available_regions' must not be empty".to_string());
            } else if !available.contains(&self.region) {
                errors.push(format!(
                    "'region' {} is not in 'available_regions'",
                    self.region
                ));
            }
        }

        if let Some(account_id) = &self.account_id {
            if account_id.len() != 12 || !account_id.chars().all(|c| c.is_ascii_digit()) {
                errors.push("'account_id' must be a 12-digit number".to_string());
            }
        }

        if let Some(prefix) = &self.resources_prefix {
            if self.extended_prefix_mode {
                errors.extend(validate_extended_prefix("resources_prefix", prefix));
            } else if prefix.chars().count() > MAX_AFFIX_LEN {
                errors.push(format!(
                    "The length of resources_prefix must be less or equal to {} characters",
                    MAX_AFFIX_LEN
                ));
            }
        }
        if let Some(suffix) = &self.resources_suffix {
            if suffix.chars().count() > MAX_AFFIX_LEN {
                errors.push(format!(
                    "The length of resources_suffix must be less or equal to {} characters",
                    MAX_AFFIX_LEN
                ));
            }
        }

        if self.concurrency == 0 {
            errors.push("'concurrency' must be at least 1".to_string());
        }
        if self.retry.unit_ms == 0 && self.retry.count > 0 {
            errors.push("'retry.unit_ms' must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn project_path(&self) -> PathBuf {
        self.project_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.project_path().join(CONFIG_DIR).join("bundles"))
    }

    pub fn local_cloud_path(&self) -> PathBuf {
        self.local_cloud_path
            .clone()
            .unwrap_or_else(|| self.project_path().join(CONFIG_DIR).join("local"))
    }
}

fn validate_extended_prefix(key: &str, value: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if value.chars().count() > MAX_EXTENDED_PREFIX_LEN {
        errors.push(format!(
            "The length of {} must be less or equal to {} characters",
            key, MAX_EXTENDED_PREFIX_LEN
        ));
    }
    if value.contains("--") {
        errors.push(format!("The {} must not contain two consecutive hyphens", key));
    }
    if !value.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        errors.push(format!("The first character of the {} must be a letter", key));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        errors.push(format!(
            "The {} must contain only lowercase letters, numbers, and hyphens",
            key
        ));
    }
    errors
}

/// Global config directory (`~/.config/stackwright`)
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackwright");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// Find the config file.
///
/// Search order:
/// 1. `STACKWRIGHT_CONFIG`
/// 2. current directory: stackwright.local.yaml, stackwright.yaml
/// 3. `./.stackwright/`, same order
/// 4. `~/.config/stackwright/stackwright.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CONFIG_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let config_dir = current_dir.join(CONFIG_DIR);
    if config_dir.is_dir() {
        for filename in &CONFIG_CANDIDATES {
            let path = config_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("stackwright").join("stackwright.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackwright.yaml"), "region: eu-west-1\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("stackwright.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("stackwright.yaml"), "region: eu-west-1\n").unwrap();
        fs::write(
            temp_dir.path().join("stackwright.local.yaml"),
            "region: us-east-1\n",
        )
        .unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("stackwright.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_config_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        let config_dir = temp_dir.path().join(".stackwright");
        fs::create_dir(&config_dir).unwrap();
        fs::write(config_dir.join("stackwright.yaml"), "region: eu-west-1\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let result = find_config_file();
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".stackwright/stackwright.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "region: eu-west-1\n").unwrap();

        unsafe {
            std::env::set_var(CONFIG_ENV, config_path.to_str().unwrap());
        }
        let result = find_config_file();
        unsafe {
            std::env::remove_var(CONFIG_ENV);
        }

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_load_resolves_paths_and_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackwright.yaml");
        fs::write(
            &path,
            "region: eu-west-1\n\
             account_id: \"123456789012\"\n\
             remote_state_path: shared/state.yaml\n\
             retry:\n  unit_ms: 10\n",
        )
        .unwrap();

        let config = StackwrightConfig::load(&path).unwrap();
        assert_eq!(config.project_path(), temp_dir.path());
        assert_eq!(
            config.remote_state_path.as_deref(),
            Some(temp_dir.path().join("shared/state.yaml").as_path())
        );
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(
            config.retry,
            RetrySettings {
                unit_ms: 10,
                ..RetrySettings::default()
            }
        );
        assert_eq!(
            config.local_cloud_path(),
            temp_dir.path().join(".stackwright").join("local")
        );
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = StackwrightConfig::new("eu-west-1");
        config.resources_suffix = Some("toolong".into());
        config.account_id = Some("42".into());
        config.concurrency = 0;
        config.available_regions = Some(vec!["us-east-1".into()]);

        match config.validate() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_extended_prefix_mode() {
        let mut config = StackwrightConfig::new("eu-west-1");
        config.resources_prefix = Some("team-orders".into());
        assert!(config.validate().is_err());

        config.extended_prefix_mode = true;
        assert!(config.validate().is_ok());

        config.resources_prefix = Some("9-Bad--prefix".into());
        match config.validate() {
            Err(ConfigError::Invalid(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("stackwright.yaml");
        fs::write(&path, "concurrency: [").unwrap();
        let err = StackwrightConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("stackwright.yaml"));
    }
}
