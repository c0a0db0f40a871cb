//! Error taxonomy for cloud resource orchestration

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Orchestration errors
#[derive(Error, Debug)]
pub enum CloudError {
    /// Remote business-rule rejection, or a transport failure carried as its cause
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("Timed out after {waited:?} waiting for {resource}")]
    PollTimeout { resource: String, waited: Duration },

    #[error("Probe for {resource} failed {attempts} times in a row: {source}")]
    PollProbe {
        resource: String,
        attempts: u32,
        #[source]
        source: Box<CloudError>,
    },

    #[error("{resource} entered terminal state {state}")]
    ResourceFailed { resource: String, state: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Regions(#[from] AggregateRegionError),

    #[error("Region task failed: {0}")]
    TaskFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        match self {
            CloudError::Action(e) => e.is_transient(),
            CloudError::PollTimeout { .. } => true,
            CloudError::PollProbe { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// The embedded action error, if this is one
    pub fn as_action(&self) -> Option<&ActionError> {
        match self {
            CloudError::Action(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is a remote "no such resource" rejection
    pub fn is_not_found(&self) -> bool {
        self.as_action().is_some_and(ActionError::is_not_found)
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Failure of the transport itself (network, signature, timeout)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new("NetworkError", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("Timeout", message)
    }

    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::new(format!("HttpStatus{}", status), body)
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::new("SignatureFailure", message)
    }
}

/// Error raised for one remote action
///
/// Carries the remote code, message and request id verbatim so the failure can
/// be correlated with the provider's support channel.
#[derive(Error, Debug, Clone)]
pub struct ActionError {
    /// `API_<SERVICE>_<Action>`
    pub domain: String,
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    #[source]
    pub cause: Option<TransportError>,
}

impl ActionError {
    /// Build the error domain for a service/action pair
    pub fn domain_for(service: &str, action: &str) -> String {
        format!("API_{}_{}", service.to_uppercase(), action)
    }

    pub fn from_transport(service: &str, action: &str, cause: TransportError) -> Self {
        Self {
            domain: Self::domain_for(service, action),
            code: cause.code.clone(),
            message: cause.message.clone(),
            request_id: None,
            cause: Some(cause),
        }
    }

    /// True when the transport failed rather than the remote service
    pub fn is_transport(&self) -> bool {
        self.cause.is_some()
    }

    /// `ResourceNotFound` and its sub-codes (`ResourceNotFound.FileSystemNotFound`, ...)
    pub fn is_not_found(&self) -> bool {
        self.code == "ResourceNotFound" || self.code.starts_with("ResourceNotFound.")
    }

    /// Transport failures and codes the provider documents as temporary
    pub fn is_transient(&self) -> bool {
        const TRANSIENT_PREFIXES: [&str; 4] = [
            "RequestLimitExceeded",
            "InternalError",
            "ResourceUnavailable",
            "FailedOperation.ResourceBusy",
        ];

        self.is_transport()
            || TRANSIENT_PREFIXES
                .iter()
                .any(|prefix| self.code.starts_with(prefix))
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: [{}] {}", self.domain, self.code, self.message)?;
        if let Some(request_id) = &self.request_id {
            write!(f, " (RequestId: {})", request_id)?;
        }
        Ok(())
    }
}

/// Per-region failures of one orchestrated operation
///
/// Regions that succeeded are preserved in `succeeded`; they are not rolled back.
#[derive(Error, Debug)]
pub struct AggregateRegionError {
    pub operation: String,
    pub failures: BTreeMap<String, CloudError>,
    pub succeeded: BTreeMap<String, serde_json::Value>,
}

impl AggregateRegionError {
    pub fn failed_regions(&self) -> impl Iterator<Item = &str> {
        self.failures.keys().map(String::as_str)
    }
}

impl fmt::Display for AggregateRegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed in {} region(s)",
            self.operation,
            self.failures.len()
        )?;
        for (region, error) in &self.failures {
            write!(f, "\n  {}: {}", region, error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_error(code: &str) -> ActionError {
        ActionError {
            domain: ActionError::domain_for("cfs", "DescribeCfsFileSystems"),
            code: code.to_string(),
            message: "boom".to_string(),
            request_id: Some("r-9".to_string()),
            cause: None,
        }
    }

    #[test]
    fn test_domain_uppercases_service() {
        assert_eq!(
            ActionError::domain_for("cfs", "DescribeCfsFileSystems"),
            "API_CFS_DescribeCfsFileSystems"
        );
    }

    #[test]
    fn test_not_found_codes() {
        assert!(action_error("ResourceNotFound").is_not_found());
        assert!(action_error("ResourceNotFound.FileSystemNotFound").is_not_found());
        assert!(!action_error("ResourceNotFoundish").is_not_found());
        assert!(!action_error("InvalidParameter").is_not_found());
    }

    #[test]
    fn test_transient_classification() {
        assert!(action_error("RequestLimitExceeded").is_transient());
        assert!(action_error("InternalError.DbError").is_transient());
        assert!(!action_error("LimitExceeded.Quota").is_transient());

        let transport =
            ActionError::from_transport("cfs", "CreateCfsFileSystem", TransportError::timeout("slow"));
        assert!(transport.is_transient());
        assert_eq!(transport.code, "Timeout");
        assert!(transport.request_id.is_none());
    }

    #[test]
    fn test_display_includes_request_id() {
        let message = action_error("InvalidParameter").to_string();
        assert!(message.contains("API_CFS_DescribeCfsFileSystems"));
        assert!(message.contains("[InvalidParameter] boom"));
        assert!(message.contains("RequestId: r-9"));
    }

    #[test]
    fn test_config_errors_are_not_retryable() {
        assert!(!CloudError::InvalidConfig("shared id".into()).is_retryable());
        assert!(
            CloudError::PollTimeout {
                resource: "cfs".into(),
                waited: Duration::from_secs(1)
            }
            .is_retryable()
        );
    }
}
