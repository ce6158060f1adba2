use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

pub const METRIC_CURRENT_NODE_COUNT: &str = "gke.node_pool.current_node_count";
pub const METRIC_MAX_NODE_COUNT: &str = "gke.node_pool.max_node_count";
pub const METRIC_NODE_USAGE_PERCENT: &str = "gke.node_pool.node_usage_percent";

#[derive(Debug, Clone)]
pub struct Config {
    pub project_ids: Vec<String>,
    pub region: String,
    pub new_relic_api_key: String,
    pub credentials_path: String,
    pub retry: RetrySettings,
    pub http_timeout: Duration,
    pub endpoints: Endpoints,
    pub telemetry_batch_size: usize,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub gke: String,
    pub compute: String,
    pub new_relic_metrics: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub location: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePool {
    pub name: String,
    pub max_node_count: u64,
    pub instance_group_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceGroupRef {
    pub project: String,
    pub zone: String,
    pub name: String,
}

/// Capacity snapshot for a single node pool, identified by (project, cluster, pool).
#[derive(Debug, Clone, PartialEq)]
pub struct NodePoolMetric {
    pub project_id: String,
    pub cluster_name: String,
    pub node_pool_name: String,
    pub current_node_count: u64,
    pub max_node_count: u64,
    /// `None` when the pool has no autoscaling maximum.
    pub usage_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeMetric {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: f64,
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct MetricPayload<'a> {
    pub common: CommonBlock,
    pub metrics: &'a [GaugeMetric],
}

#[derive(Debug, Serialize)]
pub struct CommonBlock {
    pub attributes: BTreeMap<String, String>,
}
