//! Multi-region fan-out
//!
//! One logical deployment becomes one driver invocation per region. Regions
//! run concurrently and fail independently: a failed region never cancels the
//! others, and regions that succeeded are reported, not rolled back.

use crate::action::Dispatcher;
use crate::driver::ResourceDriver;
use crate::error::{AggregateRegionError, CloudError, Result};
use crate::region::DeploymentRequest;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Per-region results keyed by region
pub type RegionResultMap<T> = BTreeMap<String, T>;

/// Orchestrator tuning
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Upper bound on regions in flight at once; `None` runs all of them
    pub max_concurrent_regions: Option<usize>,
}

/// Runs one resource driver across many regions
pub struct MultiRegionOrchestrator<D: ResourceDriver> {
    driver: Arc<D>,
    dispatcher: Dispatcher,
    config: OrchestratorConfig,
}

impl<D: ResourceDriver> MultiRegionOrchestrator<D> {
    pub fn new(driver: D, dispatcher: Dispatcher) -> Self {
        Self {
            driver: Arc::new(driver),
            dispatcher,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Deploy to every region of `request`
    ///
    /// Returns every region's snapshot, or [`CloudError::Regions`] listing each
    /// failed region once all regions have finished.
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<RegionResultMap<D::Snapshot>> {
        let planned = self.plan(request)?;
        tracing::info!(
            kind = self.driver.kind(),
            regions = planned.len(),
            "Deploying"
        );

        let (results, mut failures) = self
            .fan_out(planned, |driver, api, config| async move {
                driver.deploy(&api, &config).await
            })
            .await;

        if failures.is_empty() {
            return Ok(results);
        }

        let mut succeeded = BTreeMap::new();
        for (region, snapshot) in results {
            match serde_json::to_value(snapshot) {
                Ok(value) => {
                    succeeded.insert(region, value);
                }
                Err(e) => {
                    tracing::warn!(region = %region, "Deployed, but the snapshot could not be serialized: {}", e);
                    failures.insert(region, CloudError::Json(e));
                }
            }
        }

        Err(self.aggregate("deploy", failures, succeeded))
    }

    /// Remove the resource from every region of `request`
    pub async fn remove(&self, request: &DeploymentRequest) -> Result<()> {
        let planned = self.plan(request)?;
        tracing::info!(
            kind = self.driver.kind(),
            regions = planned.len(),
            "Removing"
        );

        let (removed, failures) = self
            .fan_out(planned, |driver, api, config| async move {
                driver.remove(&api, &config).await
            })
            .await;

        if failures.is_empty() {
            return Ok(());
        }

        let succeeded = removed
            .into_keys()
            .map(|region| (region, Value::Null))
            .collect();

        Err(self.aggregate("remove", failures, succeeded))
    }

    /// Validate the request and build each region's typed config
    fn plan(&self, request: &DeploymentRequest) -> Result<Vec<(String, D::Config)>> {
        let merged = request.merged();

        if merged.len() > 1 {
            if let Some(field) = self.driver.identity_field() {
                if request.base().get(field).is_some_and(|v| !v.is_null()) {
                    return Err(CloudError::InvalidConfig(format!(
                        "`{}` identifies a single {} and cannot be shared by {} regions; \
                         set it per region instead",
                        field,
                        self.driver.kind(),
                        merged.len()
                    )));
                }
            }
        }

        merged
            .into_iter()
            .map(|(region, config)| {
                serde_json::from_value::<D::Config>(Value::Object(config))
                    .map(|config| (region.clone(), config))
                    .map_err(|e| CloudError::InvalidConfig(format!("{}: {}", region, e)))
            })
            .collect()
    }

    /// Run `operation` once per region, concurrently, and wait for all of them
    async fn fan_out<T, F, Fut>(
        &self,
        planned: Vec<(String, D::Config)>,
        operation: F,
    ) -> (RegionResultMap<T>, BTreeMap<String, CloudError>)
    where
        T: Send + 'static,
        F: Fn(Arc<D>, Dispatcher, D::Config) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let limit = self
            .config
            .max_concurrent_regions
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        // Each task owns exactly one region key; the maps are only built here.
        let mut handles = Vec::with_capacity(planned.len());
        for (region, config) in planned {
            let api = self.dispatcher.for_region(region.as_str());
            let task = operation(Arc::clone(&self.driver), api, config);
            let limit = limit.clone();
            let span = tracing::info_span!("region", region = %region);

            let handle = tokio::spawn(
                async move {
                    let _permit = match limit {
                        Some(semaphore) => semaphore.acquire_owned().await.ok(),
                        None => None,
                    };
                    task.await
                }
                .instrument(span),
            );
            handles.push((region, handle));
        }

        let mut results = RegionResultMap::new();
        let mut failures = BTreeMap::new();
        for (region, handle) in handles {
            match handle.await {
                Ok(Ok(value)) => {
                    tracing::info!(region = %region, "Region succeeded");
                    results.insert(region, value);
                }
                Ok(Err(e)) => {
                    tracing::warn!(region = %region, "Region failed: {}", e);
                    failures.insert(region, e);
                }
                Err(join_error) => {
                    tracing::warn!(region = %region, "Region task aborted: {}", join_error);
                    failures.insert(region, CloudError::TaskFailed(join_error.to_string()));
                }
            }
        }

        (results, failures)
    }

    fn aggregate(
        &self,
        operation: &str,
        failures: BTreeMap<String, CloudError>,
        succeeded: BTreeMap<String, Value>,
    ) -> CloudError {
        CloudError::Regions(AggregateRegionError {
            operation: format!("{} {}", self.driver.kind(), operation),
            failures,
            succeeded,
        })
    }
}
