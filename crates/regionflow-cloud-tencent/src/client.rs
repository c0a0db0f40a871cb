//! HTTP transport for the Tencent Cloud API
//!
//! Every action is a signed JSON `POST /` against `<service>.<api_domain>`.

use crate::credentials::TencentConfig;
use crate::error::Result;
use crate::signer::{self, CONTENT_TYPE};
use async_trait::async_trait;
use regionflow_cloud::{Transport, TransportError, TransportRequest};
use serde_json::Value;

/// Signed HTTPS transport
pub struct TencentTransport {
    client: reqwest::Client,
    config: TencentConfig,
    endpoint: Option<String>,
}

impl TencentTransport {
    pub fn new(config: TencentConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            config,
            endpoint: None,
        })
    }

    /// Send every request to `endpoint` instead of the per-service host
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn url_for(&self, host: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}/", host),
        }
    }

    /// Headers for one request, including the signature
    fn headers(
        &self,
        request: &TransportRequest,
        host: &str,
        payload: &str,
        timestamp: i64,
    ) -> std::result::Result<Vec<(&'static str, String)>, TransportError> {
        let authorization = signer::authorization(
            &self.config.credentials,
            &request.service,
            host,
            payload,
            timestamp,
        )
        .map_err(|e| TransportError::signing(e.to_string()))?;

        let mut headers = vec![
            ("Authorization", authorization),
            ("Content-Type", CONTENT_TYPE.to_string()),
            ("Host", host.to_string()),
            ("X-TC-Action", request.action.clone()),
            ("X-TC-Version", request.version.clone()),
            ("X-TC-Timestamp", timestamp.to_string()),
        ];
        if let Some(region) = &request.region {
            headers.push(("X-TC-Region", region.clone()));
        }
        if let Some(token) = &self.config.credentials.token {
            headers.push(("X-TC-Token", token.clone()));
        }

        Ok(headers)
    }
}

#[async_trait]
impl Transport for TencentTransport {
    async fn send(&self, request: &TransportRequest) -> std::result::Result<Value, TransportError> {
        let payload = serde_json::to_string(&request.parameters)
            .map_err(|e| TransportError::new("InvalidParameter", e.to_string()))?;
        let host = self.config.host_for(&request.service);
        let timestamp = chrono::Utc::now().timestamp();

        let mut builder = self.client.post(self.url_for(&host));
        for (name, value) in self.headers(request, &host, &payload, timestamp)? {
            builder = builder.header(name, value);
        }

        let response = builder.body(payload).send().await.map_err(from_reqwest)?;
        let status = response.status();
        let body = response.text().await.map_err(from_reqwest)?;

        match serde_json::from_str::<Value>(&body) {
            Ok(envelope) => Ok(envelope),
            Err(_) if !status.is_success() => {
                Err(TransportError::http_status(status.as_u16(), body))
            }
            Err(e) => Err(TransportError::new(
                "InvalidResponse",
                format!("response is not JSON: {}", e),
            )),
        }
    }
}

fn from_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::timeout(e.to_string())
    } else {
        TransportError::network(e.to_string())
    }
}
