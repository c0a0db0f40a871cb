//! Credentials and endpoint configuration

use crate::error::{Result, TencentError};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_DOMAIN: &str = "tencentcloudapi.com";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_SECRET_ID: &str = "TENCENTCLOUD_SECRET_ID";
const ENV_SECRET_KEY: &str = "TENCENTCLOUD_SECRET_KEY";
const ENV_SESSION_TOKEN: &str = "TENCENTCLOUD_SESSION_TOKEN";
const ENV_API_DOMAIN: &str = "TENCENTCLOUD_API_DOMAIN";

/// API key pair, plus a session token for temporary credentials
#[derive(Clone)]
pub struct Credentials {
    pub secret_id: String,
    pub secret_key: String,
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"***")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Configuration for the Tencent Cloud transport
#[derive(Debug, Clone)]
pub struct TencentConfig {
    pub credentials: Credentials,

    /// Endpoint domain; requests go to `https://<service>.<api_domain>/`
    pub api_domain: String,

    pub request_timeout: Duration,
}

impl TencentConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            api_domain: DEFAULT_API_DOMAIN.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create TencentConfig from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_id = std::env::var(ENV_SECRET_ID)
            .map_err(|_| TencentError::MissingEnvVar(ENV_SECRET_ID.to_string()))?;
        let secret_key = std::env::var(ENV_SECRET_KEY)
            .map_err(|_| TencentError::MissingEnvVar(ENV_SECRET_KEY.to_string()))?;

        let mut credentials = Credentials::new(secret_id, secret_key);
        if let Ok(token) = std::env::var(ENV_SESSION_TOKEN) {
            if !token.is_empty() {
                credentials = credentials.with_token(token);
            }
        }

        let mut config = Self::new(credentials);
        if let Ok(domain) = std::env::var(ENV_API_DOMAIN) {
            if !domain.is_empty() {
                config.api_domain = domain;
            }
        }

        Ok(config)
    }

    pub fn with_api_domain(mut self, domain: impl Into<String>) -> Self {
        self.api_domain = domain.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Host serving `service`
    pub fn host_for(&self, service: &str) -> String {
        format!("{}.{}", service, self.api_domain)
    }
}
