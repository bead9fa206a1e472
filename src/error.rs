use thiserror::Error;

#[derive(Error, Debug)]
pub enum RicaError {
    #[error("Invalid package name: '{0}'")]
    PackageInvalid(String),

    #[error("Package '{0}' is already installed")]
    PackageExists(String),

    #[error("Package '{0}' not found")]
    PackageNotFound(String),

    #[error("Route '{route}' already exists in package '{package}'")]
    RouteExists { package: String, route: String },

    #[error("Route '{route}' not found in package '{package}'")]
    RouteNotFound { package: String, route: String },

    #[error("Invalid rica tag: {0}")]
    InvalidTag(String),

    #[error("Tool call timed out: {package}{route} after {timeout_ms}ms")]
    ExecutionTimedOut {
        package: String,
        route: String,
        timeout_ms: u64,
    },

    #[error("Tool execution error: {package}{route}: {message}")]
    ToolExecution {
        package: String,
        route: String,
        message: String,
    },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type RicaResult<T> = Result<T, RicaError>;
