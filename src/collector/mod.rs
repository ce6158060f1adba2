use chrono::Utc;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::gke::ClusterManager;
use crate::metrics::build_gauges;
use crate::report::{RunReport, SkipStage, SkippedItem};
use crate::retry::{retry, RetryPolicy};
use crate::telemetry::TelemetrySink;
use crate::types::{Cluster, GaugeMetric, NodePool, NodePoolMetric};

#[cfg(test)]
mod tests;

/// Walks projects → clusters → node pools and ships the resulting gauges.
pub struct NodePoolCollector<'a> {
    clusters: &'a dyn ClusterManager,
    sink: &'a dyn TelemetrySink,
    policy: RetryPolicy,
    region: String,
    batch_size: usize,
}

impl<'a> NodePoolCollector<'a> {
    pub fn new(
        clusters: &'a dyn ClusterManager,
        sink: &'a dyn TelemetrySink,
        policy: RetryPolicy,
        region: &str,
        batch_size: usize,
    ) -> Self {
        Self {
            clusters,
            sink,
            policy,
            region: region.to_string(),
            batch_size: batch_size.max(1),
        }
    }

    /// Collect, then submit. Never fails: every problem ends up in the report.
    pub async fn run(&self, project_ids: &[String]) -> RunReport {
        let mut report = self.collect(project_ids).await;
        self.submit(&mut report).await;
        report
    }

    pub async fn collect(&self, project_ids: &[String]) -> RunReport {
        let mut report = RunReport::new();
        for project in project_ids {
            info!(project = %project, region = %self.region, "scanning project");
            self.collect_project(project, &mut report).await;
            report.projects_scanned += 1;
        }
        report
    }

    async fn collect_project(&self, project: &str, report: &mut RunReport) {
        let clusters = match retry(&self.policy, "list_clusters", || {
            self.clusters.list_clusters(project, &self.region)
        })
        .await
        {
            Ok(c) => c,
            Err(err) => {
                warn!(project, error = %err, "skipping project: cluster list failed");
                report.record_skip(SkippedItem {
                    stage: SkipStage::ListClusters,
                    project_id: Some(project.to_string()),
                    cluster_name: None,
                    node_pool_name: None,
                    error: err.to_string(),
                });
                return;
            }
        };

        info!(project, count = clusters.len(), "found clusters");
        for cluster in &clusters {
            report.clusters_seen += 1;
            self.collect_cluster(project, cluster, report).await;
        }
    }

    async fn collect_cluster(&self, project: &str, cluster: &Cluster, report: &mut RunReport) {
        let pools = match retry(&self.policy, "list_node_pools", || {
            self.clusters
                .list_node_pools(project, &self.region, &cluster.name)
        })
        .await
        {
            Ok(p) => p,
            Err(err) => {
                warn!(project, cluster = %cluster.name, error = %err, "skipping cluster: node pool list failed");
                report.record_skip(SkippedItem {
                    stage: SkipStage::ListNodePools,
                    project_id: Some(project.to_string()),
                    cluster_name: Some(cluster.name.clone()),
                    node_pool_name: None,
                    error: err.to_string(),
                });
                return;
            }
        };

        for pool in &pools {
            match self.current_node_count(pool).await {
                Ok(current) => {
                    let metric =
                        NodePoolMetric::new(project, &cluster.name, &pool.name, current, pool.max_node_count);
                    info!(
                        project,
                        cluster = %cluster.name,
                        node_pool = %pool.name,
                        current_node_count = metric.current_node_count,
                        max_node_count = metric.max_node_count,
                        usage_percent = ?metric.usage_percentage,
                        "node pool capacity"
                    );
                    report.add_metric(metric);
                }
                Err(err) => {
                    warn!(
                        project,
                        cluster = %cluster.name,
                        node_pool = %pool.name,
                        error = %err,
                        "skipping node pool: instance count failed"
                    );
                    report.record_skip(SkippedItem {
                        stage: SkipStage::CountInstances,
                        project_id: Some(project.to_string()),
                        cluster_name: Some(cluster.name.clone()),
                        node_pool_name: Some(pool.name.clone()),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    /// Sum of instances across the pool's instance groups (one per zone).
    async fn current_node_count(&self, pool: &NodePool) -> Result<u64, crate::error::ApiError> {
        let mut total = 0;
        for url in &pool.instance_group_urls {
            total += retry(&self.policy, "count_instances", || self.clusters.count_instances(url)).await?;
        }
        Ok(total)
    }

    /// Send every collected metric, `batch_size` gauges per request.
    /// A failed chunk is logged and skipped; later chunks are still sent.
    pub async fn submit(&self, report: &mut RunReport) {
        let gauges = build_gauges(&report.metrics, &self.region, Utc::now().timestamp_millis());
        if gauges.is_empty() {
            info!("no node pool metrics to submit");
            return;
        }

        for (index, chunk) in gauges.chunks(self.batch_size).enumerate() {
            match retry(&self.policy, "send_batch", || self.sink.send_batch(chunk)).await {
                Ok(()) => {
                    report.gauges_sent += chunk.len();
                    report.batches_sent += 1;
                }
                Err(err) => {
                    report.batches_failed += 1;
                    for (project, cluster, pool) in chunk_pools(chunk) {
                        warn!(
                            batch = index,
                            project = %project,
                            cluster = %cluster,
                            node_pool = %pool,
                            error = %err,
                            "dropping node pool metrics: batch submission failed"
                        );
                        report.record_skip(SkippedItem {
                            stage: SkipStage::SubmitTelemetry,
                            project_id: Some(project),
                            cluster_name: Some(cluster),
                            node_pool_name: Some(pool),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Distinct (project, cluster, pool) tuples whose gauges are in `chunk`.
fn chunk_pools(chunk: &[GaugeMetric]) -> BTreeSet<(String, String, String)> {
    let attr = |g: &GaugeMetric, key: &str| g.attributes.get(key).cloned().unwrap_or_default();
    chunk
        .iter()
        .map(|g| (attr(g, "project_id"), attr(g, "cluster_name"), attr(g, "node_pool_name")))
        .collect()
}
