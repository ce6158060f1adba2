use std::fmt;

use crate::types::NodePoolMetric;

/// Where in the run a failure forced something to be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipStage {
    ListClusters,
    ListNodePools,
    CountInstances,
    SubmitTelemetry,
}

impl fmt::Display for SkipStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipStage::ListClusters => "list_clusters",
            SkipStage::ListNodePools => "list_node_pools",
            SkipStage::CountInstances => "count_instances",
            SkipStage::SubmitTelemetry => "submit_telemetry",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub stage: SkipStage,
    pub project_id: Option<String>,
    pub cluster_name: Option<String>,
    pub node_pool_name: Option<String>,
    pub error: String,
}

/// Everything one run collected, sent and skipped.
#[derive(Debug, Default)]
pub struct RunReport {
    pub projects_scanned: usize,
    pub clusters_seen: usize,
    pub metrics: Vec<NodePoolMetric>,
    pub gauges_sent: usize,
    pub batches_sent: usize,
    pub batches_failed: usize,
    pub skipped: Vec<SkippedItem>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metric(&mut self, metric: NodePoolMetric) {
        self.metrics.push(metric);
    }

    pub fn record_skip(&mut self, item: SkippedItem) {
        self.skipped.push(item);
    }

    pub fn skipped_at(&self, stage: SkipStage) -> usize {
        self.skipped.iter().filter(|s| s.stage == stage).count()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            projects_scanned: self.projects_scanned,
            clusters_seen: self.clusters_seen,
            node_pools_collected: self.metrics.len(),
            gauges_sent: self.gauges_sent,
            batches_sent: self.batches_sent,
            projects_skipped: self.skipped_at(SkipStage::ListClusters),
            clusters_skipped: self.skipped_at(SkipStage::ListNodePools),
            node_pools_skipped: self.skipped_at(SkipStage::CountInstances),
            batches_failed: self.batches_failed,
            node_pools_unsent: self.skipped_at(SkipStage::SubmitTelemetry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub projects_scanned: usize,
    pub clusters_seen: usize,
    pub node_pools_collected: usize,
    pub gauges_sent: usize,
    pub batches_sent: usize,
    pub projects_skipped: usize,
    pub clusters_skipped: usize,
    pub node_pools_skipped: usize,
    pub batches_failed: usize,
    pub node_pools_unsent: usize,
}

impl RunSummary {
    pub fn total_skipped(&self) -> usize {
        self.projects_skipped + self.clusters_skipped + self.node_pools_skipped + self.batches_failed
    }

    pub fn is_complete(&self) -> bool {
        self.total_skipped() == 0
    }
}
