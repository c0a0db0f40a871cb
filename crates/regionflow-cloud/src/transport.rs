//! Transport boundary
//!
//! The transport signs and sends one request and hands back the raw response
//! envelope. Credential handling and signing live entirely behind this trait.

use crate::error::TransportError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// Request descriptor handed to a [`Transport`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportRequest {
    /// Service endpoint name (e.g., "cfs", "scf")
    pub service: String,

    /// API version (e.g., "2019-07-19")
    pub version: String,

    /// Action name (e.g., "DescribeCfsFileSystems")
    pub action: String,

    /// Target region; `None` for global services
    pub region: Option<String>,

    pub parameters: Map<String, Value>,
}

/// Sends signed requests to the remote provider
///
/// Implementations return the envelope exactly as received:
/// `{"Response": {..., "Error"?: {"Code", "Message"}, "RequestId"}}`.
/// Business failures inside the envelope are not a transport concern.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<Value, TransportError>;
}
