//! Eventual-consistency poller
//!
//! Resamples a resource until it reaches a target state. Waiting for a
//! resource to appear and waiting for it to disappear run through the same
//! loop; absence is just another target.

use crate::error::{CloudError, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Default sampling interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Consecutive unclassified probe failures tolerated before giving up
pub const DEFAULT_MAX_PROBE_FAILURES: u32 = 3;

/// One observation of a remote resource
#[derive(Debug, Clone, PartialEq)]
pub enum PollSample {
    /// Resource exists; its current fields
    Present(Map<String, Value>),
    /// Resource does not exist
    Absent,
}

impl PollSample {
    pub fn is_absent(&self) -> bool {
        matches!(self, PollSample::Absent)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            PollSample::Present(fields) => fields.get(name),
            PollSample::Absent => None,
        }
    }

    pub fn into_fields(self) -> Option<Map<String, Value>> {
        match self {
            PollSample::Present(fields) => Some(fields),
            PollSample::Absent => None,
        }
    }
}

/// Condition a wait is satisfied by
#[derive(Debug, Clone, PartialEq)]
pub enum PollTarget {
    /// `field` equals `value`
    Field { field: String, value: Value },
    /// Probe reports absence
    Absent,
}

impl PollTarget {
    pub fn field(field: impl Into<String>, value: impl Into<Value>) -> Self {
        PollTarget::Field {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_met_by(&self, sample: &PollSample) -> bool {
        match self {
            PollTarget::Field { field, value } => sample.field(field) == Some(value),
            PollTarget::Absent => sample.is_absent(),
        }
    }
}

/// Per-resource-type timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// A single wait
pub struct PollSpec<P> {
    /// Resource description used in logs and errors
    pub resource: String,
    pub probe: P,
    pub target: PollTarget,
    pub interval: Duration,
    pub timeout: Duration,
    /// Values of the target field that mean the resource will never get there
    pub fail_on: Vec<Value>,
    pub max_probe_failures: u32,
}

impl<P, F> PollSpec<P>
where
    P: FnMut() -> F,
    F: Future<Output = Result<PollSample>>,
{
    pub fn new(
        resource: impl Into<String>,
        probe: P,
        target: PollTarget,
        settings: PollSettings,
    ) -> Self {
        Self {
            resource: resource.into(),
            probe,
            target,
            interval: settings.interval,
            timeout: settings.timeout,
            fail_on: Vec::new(),
            max_probe_failures: DEFAULT_MAX_PROBE_FAILURES,
        }
    }

    pub fn fail_on(mut self, value: impl Into<Value>) -> Self {
        self.fail_on.push(value.into());
        self
    }

    fn terminal_state<'a>(&'a self, sample: &'a PollSample) -> Option<&'a Value> {
        let PollTarget::Field { field, .. } = &self.target else {
            return None;
        };
        sample
            .field(field)
            .filter(|state| self.fail_on.contains(state))
    }
}

/// Sample `spec.probe` until `spec.target` holds
///
/// Samples at start and then every `interval`. Fails with
/// [`CloudError::PollTimeout`] once `timeout` has elapsed; the last sleep is
/// clamped so the final sample lands on the deadline. "Not found" probe errors
/// are expected while a resource is still appearing and are retried; other
/// probe errors fail the wait after `max_probe_failures` in a row.
pub async fn wait_for<P, F>(mut spec: PollSpec<P>) -> Result<PollSample>
where
    P: FnMut() -> F,
    F: Future<Output = Result<PollSample>>,
{
    let started = Instant::now();
    let mut consecutive_failures = 0;

    loop {
        match (spec.probe)().await {
            Ok(sample) => {
                consecutive_failures = 0;

                if spec.target.is_met_by(&sample) {
                    tracing::debug!(
                        resource = %spec.resource,
                        "Reached target after {:?}",
                        started.elapsed()
                    );
                    return Ok(sample);
                }

                if let Some(state) = spec.terminal_state(&sample) {
                    return Err(CloudError::ResourceFailed {
                        resource: spec.resource.clone(),
                        state: state
                            .as_str()
                            .map_or_else(|| state.to_string(), str::to_string),
                    });
                }

                tracing::debug!(resource = %spec.resource, target = ?spec.target, "Not there yet");
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(resource = %spec.resource, "Not visible yet: {}", e);
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures >= spec.max_probe_failures {
                    return Err(CloudError::PollProbe {
                        resource: spec.resource.clone(),
                        attempts: consecutive_failures,
                        source: Box::new(e),
                    });
                }
                tracing::warn!(
                    resource = %spec.resource,
                    attempt = consecutive_failures,
                    "Probe failed: {}",
                    e
                );
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= spec.timeout {
            return Err(CloudError::PollTimeout {
                resource: spec.resource.clone(),
                waited: elapsed,
            });
        }

        sleep(spec.interval.min(spec.timeout - elapsed)).await;
    }
}
