//! Tencent Cloud provider for regionflow
//!
//! Supplies the signed HTTP [`Transport`](regionflow_cloud::Transport) and the
//! resource drivers built on the regionflow substrate.
//!
//! # Resources
//!
//! - CFS file systems ([`CfsDriver`])
//! - SCF layer versions ([`LayerDriver`])
//!
//! # Requirements
//!
//! - `TENCENTCLOUD_SECRET_ID` and `TENCENTCLOUD_SECRET_KEY`
//! - optionally `TENCENTCLOUD_SESSION_TOKEN` for temporary credentials and
//!   `TENCENTCLOUD_API_DOMAIN` for a private endpoint domain
//!
//! # Example
//!
//! ```ignore
//! use regionflow_cloud::{DeploymentRequest, Dispatcher, MultiRegionOrchestrator};
//! use regionflow_cloud_tencent::{CfsDriver, TencentConfig, TencentTransport};
//! use std::sync::Arc;
//!
//! let transport = TencentTransport::new(TencentConfig::from_env()?)?;
//! let orchestrator = MultiRegionOrchestrator::new(
//!     CfsDriver::new(),
//!     Dispatcher::new(Arc::new(transport)),
//! );
//!
//! let request: DeploymentRequest = serde_yaml::from_str(&std::fs::read_to_string("cfs.yaml")?)?;
//! let snapshots = orchestrator.deploy(&request).await?;
//! ```

pub mod cfs;
pub mod client;
pub mod credentials;
pub mod error;
pub mod layer;
pub mod regions;
pub mod signer;

pub use cfs::{CfsConfig, CfsDriver, CfsSnapshot};
pub use client::TencentTransport;
pub use credentials::{Credentials, TencentConfig};
pub use error::{Result, TencentError};
pub use layer::{LayerConfig, LayerContent, LayerDriver, LayerSnapshot};
pub use regions::{KNOWN_REGIONS, is_region};

use regionflow_cloud::{ActionError, CloudError};

/// A successful response that lacks a field the driver relies on
pub(crate) fn missing_field(service: &str, action: &str, field: &str) -> CloudError {
    CloudError::Action(ActionError {
        domain: ActionError::domain_for(service, action),
        code: "InvalidResponse".to_string(),
        message: format!("response has no {}", field),
        request_id: None,
        cause: None,
    })
}
