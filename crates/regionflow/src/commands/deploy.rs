use crate::commands;
use crate::request;
use crate::{ResourceArgs, ResourceKind};
use colored::Colorize;
use regionflow_cloud::{
    CloudError, DeploymentRequest, Dispatcher, MultiRegionOrchestrator, ResourceDriver,
};
use regionflow_cloud_tencent::{CfsDriver, LayerDriver, cfs, layer};

pub async fn handle(args: &ResourceArgs) -> anyhow::Result<()> {
    let request = request::load(&args.file, args.legacy)?;
    let dispatcher = commands::dispatcher(args.retry_config())?;

    match args.kind {
        ResourceKind::Cfs => {
            let driver =
                CfsDriver::new().with_poll_settings(args.poll_settings(cfs::DEFAULT_POLL_SETTINGS));
            deploy(driver, dispatcher, &request, args).await
        }
        ResourceKind::Layer => {
            let driver = LayerDriver::new()
                .with_poll_settings(args.poll_settings(layer::DEFAULT_POLL_SETTINGS));
            deploy(driver, dispatcher, &request, args).await
        }
    }
}

async fn deploy<D: ResourceDriver>(
    driver: D,
    dispatcher: Dispatcher,
    request: &DeploymentRequest,
    args: &ResourceArgs,
) -> anyhow::Result<()> {
    eprintln!(
        "{}",
        format!(
            "Deploying {} to {} region(s)...",
            driver.kind(),
            request.regions().len()
        )
        .blue()
        .bold()
    );

    let orchestrator =
        MultiRegionOrchestrator::new(driver, dispatcher).with_config(args.orchestrator_config());

    match orchestrator.deploy(request).await {
        Ok(snapshots) => {
            for region in snapshots.keys() {
                eprintln!("  {} {}", "✓".green(), region.cyan());
            }
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
            eprintln!("{}", "Deployed.".green().bold());
            Ok(())
        }
        Err(CloudError::Regions(aggregate)) => commands::report_partial(aggregate),
        Err(e) => Err(e.into()),
    }
}
