use std::path::PathBuf;

use thiserror::Error;

use crate::graph::GraphError;

#[derive(Error, Debug)]
pub enum SiteError {
    #[error("Missing required value {name}. Set it in the environment or in your .env file")]
    MissingInput { name: String },

    #[error("Invalid value for {name}: {reason}")]
    InvalidInput { name: String, reason: String },

    #[error("Resource graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize template: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Asset error: {0}")]
    Assets(String),
}

impl SiteError {
    pub fn missing<S: AsRef<str>>(name: S) -> Self {
        SiteError::MissingInput { name: name.as_ref().to_string() }
    }

    pub fn invalid<S: AsRef<str>, R: Into<String>>(name: S, reason: R) -> Self {
        SiteError::InvalidInput { name: name.as_ref().to_string(), reason: reason.into() }
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        SiteError::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, SiteError>;
