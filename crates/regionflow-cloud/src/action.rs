//! Action dispatch
//!
//! Turns a symbolic action into a transport call and unwraps the service's
//! response envelope. The provider reports business failures inside a
//! successful HTTP response, so the body is always inspected.

use crate::error::{ActionError, CloudError, Result};
use crate::transport::{Transport, TransportRequest};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// One remote action invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    /// Service name (e.g., "cfs")
    pub service: String,

    /// API version of the service
    pub version: String,

    /// Action name (e.g., "CreateCfsFileSystem")
    pub action: String,

    pub parameters: Map<String, Value>,
}

impl ActionRequest {
    pub fn new(
        service: impl Into<String>,
        version: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            action: action.into(),
            parameters: Map::new(),
        }
    }

    /// Add a single parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Replace all parameters
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Use a serializable struct as the parameter object
    pub fn with_body<T: Serialize>(self, body: &T) -> Result<Self> {
        match serde_json::to_value(body)? {
            Value::Object(parameters) => Ok(self.with_parameters(parameters)),
            other => Err(CloudError::InvalidConfig(format!(
                "parameters for {} must be an object, got {}",
                self.action, other
            ))),
        }
    }

    /// Error domain of this action (`API_<SERVICE>_<Action>`)
    pub fn domain(&self) -> String {
        ActionError::domain_for(&self.service, &self.action)
    }

    fn to_transport(&self, region: Option<&str>) -> TransportRequest {
        TransportRequest {
            service: self.service.clone(),
            version: self.version.clone(),
            action: self.action.clone(),
            region: region.map(str::to_string),
            parameters: self.parameters.clone(),
        }
    }
}

/// Successful action result
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    /// `Response` object without its `RequestId`
    pub payload: Map<String, Value>,

    pub request_id: String,
}

impl ActionResponse {
    /// Get a payload field as a specific type
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.payload
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the whole payload
    pub fn into_payload<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.payload))?)
    }
}

/// Unwrap a raw `{"Response": {...}}` envelope
///
/// An embedded `Error.Code` is converted into an [`ActionError`] and never
/// returned as data.
pub fn unwrap_envelope(
    service: &str,
    action: &str,
    envelope: Value,
) -> std::result::Result<ActionResponse, ActionError> {
    let domain = || ActionError::domain_for(service, action);

    let mut response = match envelope {
        Value::Object(mut root) => match root.remove("Response") {
            Some(Value::Object(response)) => response,
            _ => {
                return Err(ActionError {
                    domain: domain(),
                    code: "InvalidResponse".to_string(),
                    message: "response envelope has no Response object".to_string(),
                    request_id: None,
                    cause: None,
                });
            }
        },
        _ => {
            return Err(ActionError {
                domain: domain(),
                code: "InvalidResponse".to_string(),
                message: "response envelope is not a JSON object".to_string(),
                request_id: None,
                cause: None,
            });
        }
    };

    let request_id = match response.remove("RequestId") {
        Some(Value::String(id)) => Some(id),
        _ => None,
    };

    if let Some(error) = response.get("Error") {
        let code = error
            .get("Code")
            .and_then(Value::as_str)
            .unwrap_or("UnknownError")
            .to_string();
        let message = error
            .get("Message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        return Err(ActionError {
            domain: domain(),
            code,
            message,
            request_id,
            cause: None,
        });
    }

    Ok(ActionResponse {
        payload: response,
        request_id: request_id.unwrap_or_default(),
    })
}

/// Retry configuration for transient dispatch failures
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
            .unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Region-scoped action dispatcher
///
/// Cheap to clone; the transport is shared.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    region: Option<String>,
    retry: RetryConfig,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            region: None,
            retry: RetryConfig::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Same transport and retry policy, scoped to `region`
    pub fn for_region(&self, region: impl Into<String>) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            region: Some(region.into()),
            retry: self.retry.clone(),
        }
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Send one action and unwrap its envelope
    pub async fn dispatch(&self, request: ActionRequest) -> Result<ActionResponse> {
        let transport_request = request.to_transport(self.region.as_deref());
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            match self.dispatch_once(&transport_request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        domain = %e.domain,
                        code = %e.code,
                        attempt = attempt + 1,
                        "Transient failure, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn dispatch_once(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<ActionResponse, ActionError> {
        tracing::debug!(
            service = %request.service,
            action = %request.action,
            region = request.region.as_deref().unwrap_or("-"),
            "Dispatching action"
        );

        let envelope = self
            .transport
            .send(request)
            .await
            .map_err(|e| ActionError::from_transport(&request.service, &request.action, e))?;

        unwrap_envelope(&request.service, &request.action, envelope).inspect_err(|e| {
            tracing::warn!(
                domain = %e.domain,
                code = %e.code,
                request_id = e.request_id.as_deref().unwrap_or("-"),
                "Action rejected: {}",
                e.message
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn describe() -> ActionRequest {
        ActionRequest::new("cfs", "2019-07-19", "DescribeCfsFileSystems")
            .param("FileSystemId", "cfs-1")
    }

    #[tokio::test]
    async fn test_embedded_error_is_action_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({
            "Response": {
                "Error": { "Code": "ResourceNotFound", "Message": "file system not found" },
                "RequestId": "r-1"
            }
        }));
        let dispatcher = Dispatcher::new(transport.clone());

        let err = dispatcher.dispatch(describe()).await.unwrap_err();
        let action = err.as_action().expect("action error");
        assert_eq!(action.domain, "API_CFS_DescribeCfsFileSystems");
        assert_eq!(action.code, "ResourceNotFound");
        assert_eq!(action.message, "file system not found");
        assert_eq!(action.request_id.as_deref(), Some("r-1"));
        assert!(!action.is_transport());
    }

    #[tokio::test]
    async fn test_success_strips_request_id() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({
            "Response": { "TotalCount": 1, "RequestId": "r-2" }
        }));
        let dispatcher = Dispatcher::new(transport.clone()).for_region("ap-guangzhou");

        let response = dispatcher.dispatch(describe()).await.unwrap();
        assert_eq!(response.request_id, "r-2");
        assert_eq!(response.get::<u32>("TotalCount"), Some(1));
        assert!(!response.payload.contains_key("RequestId"));

        let sent = transport.requests();
        assert_eq!(sent[0].region.as_deref(), Some("ap-guangzhou"));
        assert_eq!(sent[0].parameters["FileSystemId"], json!("cfs-1"));
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_request_id() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(TransportError::network("connection reset"));
        let dispatcher = Dispatcher::new(transport);

        let err = dispatcher.dispatch(describe()).await.unwrap_err();
        let action = err.as_action().unwrap();
        assert_eq!(action.code, "NetworkError");
        assert_eq!(action.message, "connection reset");
        assert!(action.request_id.is_none());
        assert!(action.is_transport());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_response_object() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({ "unexpected": true }));
        let dispatcher = Dispatcher::new(transport);

        let err = dispatcher.dispatch(describe()).await.unwrap_err();
        assert_eq!(err.as_action().unwrap().code, "InvalidResponse");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_codes_only() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({
            "Response": { "Error": { "Code": "RequestLimitExceeded", "Message": "slow down" }, "RequestId": "r-3" }
        }));
        transport.push_ok(json!({ "Response": { "RequestId": "r-4" } }));
        let dispatcher = Dispatcher::new(transport.clone()).with_retry(RetryConfig::default());

        let response = dispatcher.dispatch(describe()).await.unwrap();
        assert_eq!(response.request_id, "r-4");
        assert_eq!(transport.requests().len(), 2);

        transport.push_ok(json!({
            "Response": { "Error": { "Code": "InvalidParameter", "Message": "bad" }, "RequestId": "r-5" }
        }));
        let err = dispatcher.dispatch(describe()).await.unwrap_err();
        assert_eq!(err.as_action().unwrap().code, "InvalidParameter");
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(retry.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_millis(10000));
    }

    #[test]
    fn test_retry_delay_saturates_for_large_attempts() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(70), retry.max_delay);
        assert_eq!(retry.delay_for_attempt(u32::MAX), retry.max_delay);
    }

    #[test]
    fn test_with_body_requires_object() {
        let request = ActionRequest::new("scf", "2018-04-16", "GetLayerVersion");
        tokio_test::assert_ok!(request.clone().with_body(&json!({ "LayerName": "deps" })));
        assert!(matches!(
            request.with_body(&json!(["not", "an", "object"])),
            Err(CloudError::InvalidConfig(_))
        ));
    }
}
