use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - current directory: stackwright.local.yaml, stackwright.yaml\n\
        - ./.stackwright/ directory\n\
        - ~/.config/stackwright/stackwright.yaml\n\
        Set STACKWRIGHT_CONFIG to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
