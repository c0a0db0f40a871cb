pub mod deploy;
pub mod regions;
pub mod remove;

use colored::Colorize;
use regionflow_cloud::{AggregateRegionError, Dispatcher, RetryConfig};
use regionflow_cloud_tencent::{TencentConfig, TencentTransport};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Dispatcher over the signed HTTP transport, credentials from the environment
pub fn dispatcher(retry: RetryConfig) -> anyhow::Result<Dispatcher> {
    let config = TencentConfig::from_env()?;
    let transport = TencentTransport::new(config)?;
    Ok(Dispatcher::new(Arc::new(transport)).with_retry(retry))
}

/// Print a partial failure and turn it into the command's error
///
/// Regions that succeeded are listed too; nothing was rolled back.
pub fn report_partial(error: AggregateRegionError) -> anyhow::Result<()> {
    for region in error.succeeded.keys() {
        eprintln!("  {} {}", "✓".green(), region.cyan());
    }
    for (region, cause) in &error.failures {
        eprintln!("  {} {}: {}", "✗".red(), region.cyan(), cause);
    }

    let failed: Map<String, Value> = error
        .failures
        .iter()
        .map(|(region, cause)| (region.clone(), json!(cause.to_string())))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "succeeded": error.succeeded,
            "failed": failed,
        }))?
    );

    anyhow::bail!(
        "{} failed in {} of {} region(s)",
        error.operation,
        error.failures.len(),
        error.failures.len() + error.succeeded.len()
    )
}
