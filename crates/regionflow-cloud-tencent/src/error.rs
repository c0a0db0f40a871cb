//! Tencent Cloud provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TencentError {
    #[error("Environment variable not set: {0}")]
    MissingEnvVar(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Cloud(#[from] regionflow_cloud::CloudError),
}

pub type Result<T> = std::result::Result<T, TencentError>;
