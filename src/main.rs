use anyhow::Result;
use tracing::warn;

use gke_nodepool_reporter::{run_once, LogFormat, SystemEnvironment};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Fatal errors are printed once, by anyhow, when main returns.
    let report = run_once(&SystemEnvironment).await?;

    // Partial failures are already logged per item; the run still succeeds.
    let summary = report.summary();
    if !summary.is_complete() {
        warn!(
            projects_skipped = summary.projects_skipped,
            clusters_skipped = summary.clusters_skipped,
            node_pools_skipped = summary.node_pools_skipped,
            batches_failed = summary.batches_failed,
            node_pools_unsent = summary.node_pools_unsent,
            "run completed with skipped items"
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // Read directly: tracing has to be up before config errors can be logged.
    let format = match std::env::var("LOG_FORMAT") {
        Ok(v) if v.trim().eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Text,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}
