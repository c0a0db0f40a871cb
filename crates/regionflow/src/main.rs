mod commands;
mod request;

use clap::{Args, Parser, Subcommand, ValueEnum};
use regionflow_cloud::{OrchestratorConfig, PollSettings, RetryConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regionflow")]
#[command(about = "Deploy cloud resources to many regions at once", long_about = None)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a resource in every target region
    Deploy(ResourceArgs),
    /// Delete a resource from every target region
    Remove(ResourceArgs),
    /// List known region identifiers
    Regions,
    /// Show version information
    Version,
}

/// Resource types the CLI can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum ResourceKind {
    /// CFS file system
    Cfs,
    /// SCF layer version
    Layer,
}

#[derive(Debug, Args)]
pub(crate) struct ResourceArgs {
    /// Resource type
    #[arg(value_enum)]
    pub kind: ResourceKind,

    /// Request file (YAML, or JSON with a .json extension)
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,

    /// Read region-keyed override blocks instead of an explicit `regions` list
    #[arg(long)]
    pub legacy: bool,

    /// Interval between state probes
    #[arg(long, env = "REGIONFLOW_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Give up waiting for a resource after this long
    #[arg(long, env = "REGIONFLOW_POLL_TIMEOUT_MS")]
    pub poll_timeout_ms: Option<u64>,

    /// Maximum number of regions processed at once
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Retries for transient API failures
    #[arg(long, default_value_t = 0)]
    pub retries: u32,
}

impl ResourceArgs {
    /// Resource defaults with any CLI overrides applied
    pub fn poll_settings(&self, defaults: PollSettings) -> PollSettings {
        PollSettings::new(
            self.poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            self.poll_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        )
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_regions: self.max_concurrency,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        if self.retries == 0 {
            return RetryConfig::none();
        }
        RetryConfig {
            max_attempts: self.retries.saturating_add(1),
            ..RetryConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Deploy(args) => commands::deploy::handle(&args).await,
        Commands::Remove(args) => commands::remove::handle(&args).await,
        Commands::Regions => {
            commands::regions::handle();
            Ok(())
        }
        Commands::Version => {
            println!("regionflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ResourceArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Deploy(args) | Commands::Remove(args) => args,
            _ => panic!("not a resource command"),
        }
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_poll_overrides() {
        let args = parse(&[
            "regionflow",
            "deploy",
            "cfs",
            "-f",
            "cfs.yaml",
            "--poll-interval-ms",
            "250",
        ]);
        let defaults = PollSettings::new(Duration::from_secs(2), Duration::from_secs(300));
        let settings = args.poll_settings(defaults);

        assert_eq!(args.kind, ResourceKind::Cfs);
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_retries_and_concurrency() {
        let args = parse(&[
            "regionflow",
            "remove",
            "layer",
            "--file",
            "layer.json",
            "--retries",
            "2",
            "--max-concurrency",
            "4",
        ]);

        assert_eq!(args.retry_config().max_attempts, 3);
        assert_eq!(args.orchestrator_config().max_concurrent_regions, Some(4));

        let args = parse(&["regionflow", "deploy", "layer", "-f", "layer.json"]);
        assert_eq!(args.retry_config().max_attempts, 1);
        assert_eq!(args.orchestrator_config().max_concurrent_regions, None);

        let max = u32::MAX.to_string();
        let args = parse(&["regionflow", "deploy", "layer", "-f", "layer.json", "--retries", &max]);
        assert_eq!(args.retry_config().max_attempts, u32::MAX);
    }
}
