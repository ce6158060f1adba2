use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::collector::NodePoolCollector;
use crate::config::{load_config_with_env, EnvironmentProvider};
use crate::credentials::{CredentialProvider, ServiceAccountCredentials};
use crate::gke::GkeClient;
use crate::report::RunReport;
use crate::retry::RetryPolicy;
use crate::telemetry::NewRelicClient;
use crate::types::Config;

/// One full scan-and-send cycle driven by the environment.
///
/// Returns `Err` only for configuration and credential problems, before any
/// outbound call is made. API and telemetry failures are reported in the
/// returned [`RunReport`].
pub async fn run_once<E: EnvironmentProvider>(env: &E) -> Result<RunReport> {
    let cfg = load_config_with_env(env).context("invalid configuration")?;
    let credentials = ServiceAccountCredentials::from_file(&cfg.credentials_path, cfg.http_timeout)
        .with_context(|| format!("failed to load credentials from {}", cfg.credentials_path))?;
    info!(client_email = credentials.client_email(), "loaded service account credentials");

    run_with_credentials(&cfg, Arc::new(credentials)).await
}

pub async fn run_with_credentials(
    cfg: &Config,
    credentials: Arc<dyn CredentialProvider>,
) -> Result<RunReport> {
    info!(projects = ?cfg.project_ids, region = %cfg.region, "starting node pool scan");

    let gke = GkeClient::new(
        &cfg.endpoints.gke,
        &cfg.endpoints.compute,
        credentials,
        cfg.http_timeout,
    )
    .context("failed to build GKE client")?;
    let sink = NewRelicClient::new(
        &cfg.endpoints.new_relic_metrics,
        &cfg.new_relic_api_key,
        cfg.http_timeout,
    )
    .context("failed to build New Relic client")?;

    let collector = NodePoolCollector::new(
        &gke,
        &sink,
        RetryPolicy::from(&cfg.retry),
        &cfg.region,
        cfg.telemetry_batch_size,
    );
    let report = collector.run(&cfg.project_ids).await;

    let summary = report.summary();
    info!(
        projects = summary.projects_scanned,
        clusters = summary.clusters_seen,
        node_pools = summary.node_pools_collected,
        gauges_sent = summary.gauges_sent,
        skipped = summary.total_skipped(),
        "run finished"
    );
    Ok(report)
}
