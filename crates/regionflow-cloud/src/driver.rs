//! Resource lifecycle driver abstraction

use crate::action::Dispatcher;
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of one resource type
///
/// Every resource module (file systems, layers, databases, ...) implements this
/// trait. `deploy` is create-or-update-or-noop and always re-probes first, so a
/// failed deploy can simply be retried. `remove` deletes and waits for absence;
/// a resource that is already gone counts as removed.
#[async_trait]
pub trait ResourceDriver: Send + Sync + 'static {
    /// Desired configuration, in the caller's naming convention
    type Config: DeserializeOwned + Send + Sync + 'static;

    /// Normalized view of the remote resource
    type Snapshot: Serialize + Send + 'static;

    /// Resource kind (e.g., "cfs", "layer")
    fn kind(&self) -> &str;

    /// Config key holding a pre-existing, region-scoped resource id
    fn identity_field(&self) -> Option<&str> {
        None
    }

    /// Bring the remote resource in line with `config`
    async fn deploy(&self, api: &Dispatcher, config: &Self::Config) -> Result<Self::Snapshot>;

    /// Delete the resource described by `config` and wait until it is gone
    async fn remove(&self, api: &Dispatcher, config: &Self::Config) -> Result<()>;
}

/// Lifecycle state of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    Creating,
    Stable,
    Updating,
    Deleting,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Absent => write!(f, "absent"),
            LifecycleState::Creating => write!(f, "creating"),
            LifecycleState::Stable => write!(f, "stable"),
            LifecycleState::Updating => write!(f, "updating"),
            LifecycleState::Deleting => write!(f, "deleting"),
        }
    }
}

/// Log a lifecycle transition
pub fn transition(kind: &str, id: &str, from: LifecycleState, to: LifecycleState) {
    tracing::info!(kind, id, "{} -> {}", from, to);
}

/// A mutable field whose desired value differs from the remote one
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub current: Option<Value>,
    pub desired: Value,
}

/// Compare one mutable field
///
/// An unset desired value means the field is not managed and never differs.
pub fn diff_field(
    field: &'static str,
    current: Option<&Value>,
    desired: Option<Value>,
) -> Option<FieldChange> {
    let desired = desired?;
    if current == Some(&desired) {
        return None;
    }
    Some(FieldChange {
        field,
        current: current.cloned(),
        desired,
    })
}
