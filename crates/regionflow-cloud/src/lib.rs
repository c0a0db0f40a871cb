//! regionflow cloud substrate
//!
//! The generic pieces every resource module is built from: an action
//! dispatcher that classifies the provider's response envelope, a poller that
//! waits out eventual consistency, a lifecycle driver trait, and an
//! orchestrator that runs one deployment per region concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              regionflow CLI / caller             │
//! │              (deploy / remove)                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │ DeploymentRequest
//! ┌─────────────────▼───────────────────────────────┐
//! │           MultiRegionOrchestrator                │
//! │   merge base + region overrides, fan out         │
//! └───────┬─────────────────┬───────────────────────┘
//!         │ per region      │ per region
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │ ResourceDriver│ │ ResourceDriver│   deploy / remove
//! └───────┬───────┘ └───────┬───────┘
//!         │ ActionRequest   │ wait_for(PollSpec)
//! ┌───────▼─────────────────▼───────────────────────┐
//! │   Dispatcher (envelope unwrap)  │  Poller        │
//! └───────┬─────────────────────────────────────────┘
//!         │ TransportRequest
//! ┌───────▼───────┐
//! │   Transport   │  signing + HTTP (provider crate)
//! └───────────────┘
//! ```

pub mod action;
pub mod driver;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod region;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;
pub mod waiter;

// Re-exports
pub use action::{ActionRequest, ActionResponse, Dispatcher, RetryConfig, unwrap_envelope};
pub use driver::{FieldChange, LifecycleState, ResourceDriver, diff_field, transition};
pub use error::{ActionError, AggregateRegionError, CloudError, Result, TransportError};
pub use merge::{AdditiveField, ConfigMap, merge_region_config};
pub use orchestrator::{MultiRegionOrchestrator, OrchestratorConfig, RegionResultMap};
pub use region::{DeploymentRequest, RegionConfig, RegionTarget};
pub use transport::{Transport, TransportRequest};
pub use waiter::{PollSample, PollSettings, PollSpec, PollTarget, wait_for};
