use super::*;
use crate::error::ApiError;
use crate::types::GaugeMetric;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Mutex;

fn unavailable() -> ApiError {
    ApiError::Status {
        service: "gke",
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: "backend unavailable".into(),
    }
}

fn forbidden() -> ApiError {
    ApiError::Status {
        service: "gke",
        status: StatusCode::FORBIDDEN,
        body: "permission denied".into(),
    }
}

fn pool(name: &str, max: u64, groups: &[&str]) -> NodePool {
    NodePool {
        name: name.to_string(),
        max_node_count: max,
        instance_group_urls: groups.iter().map(|g| g.to_string()).collect(),
    }
}

#[derive(Default)]
struct FakeClusterManager {
    clusters: HashMap<String, Vec<String>>,
    pools: HashMap<String, Vec<NodePool>>,
    instances: HashMap<String, u64>,
    // project -> how many leading list_clusters calls fail transiently
    flaky_projects: Mutex<HashMap<String, u32>>,
    forbidden_projects: Vec<String>,
    broken_clusters: Vec<String>,
    cluster_calls: Mutex<Vec<String>>,
    pool_calls: Mutex<Vec<String>>,
}

impl FakeClusterManager {
    fn with_cluster(mut self, project: &str, cluster: &str, pools: Vec<NodePool>) -> Self {
        self.clusters
            .entry(project.to_string())
            .or_default()
            .push(cluster.to_string());
        self.pools.insert(cluster.to_string(), pools);
        self
    }

    fn with_group(mut self, url: &str, count: u64) -> Self {
        self.instances.insert(url.to_string(), count);
        self
    }

    fn flaky(self, project: &str, failures: u32) -> Self {
        self.flaky_projects
            .lock()
            .unwrap()
            .insert(project.to_string(), failures);
        self
    }

    fn calls_for(&self, project: &str) -> usize {
        self.cluster_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == project)
            .count()
    }
}

#[async_trait]
impl ClusterManager for FakeClusterManager {
    async fn list_clusters(&self, project: &str, _region: &str) -> Result<Vec<Cluster>, ApiError> {
        self.cluster_calls.lock().unwrap().push(project.to_string());
        if self.forbidden_projects.iter().any(|p| p == project) {
            return Err(forbidden());
        }
        {
            let mut flaky = self.flaky_projects.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(project) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(unavailable());
                }
            }
        }
        Ok(self
            .clusters
            .get(project)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|name| Cluster {
                name,
                location: Some("us-central1".into()),
                status: Some("RUNNING".into()),
            })
            .collect())
    }

    async fn list_node_pools(
        &self,
        _project: &str,
        _region: &str,
        cluster: &str,
    ) -> Result<Vec<NodePool>, ApiError> {
        self.pool_calls.lock().unwrap().push(cluster.to_string());
        if self.broken_clusters.iter().any(|c| c == cluster) {
            return Err(unavailable());
        }
        Ok(self.pools.get(cluster).cloned().unwrap_or_default())
    }

    async fn count_instances(&self, instance_group_url: &str) -> Result<u64, ApiError> {
        self.instances
            .get(instance_group_url)
            .copied()
            .ok_or_else(|| ApiError::InvalidInput(format!("unknown group {}", instance_group_url)))
    }
}

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<GaugeMetric>>>,
    // 1-based indexes of send_batch calls that fail permanently
    failing_calls: Vec<usize>,
    // leading send_batch calls that fail with a 503
    transient_failures: Mutex<u32>,
    calls: Mutex<usize>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<GaugeMetric> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn send_batch(&self, gauges: &[GaugeMetric]) -> Result<(), ApiError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ApiError::Status {
                    service: "new relic",
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    body: String::new(),
                });
            }
        }
        if self.failing_calls.contains(&call) {
            return Err(ApiError::Status {
                service: "new relic",
                status: StatusCode::PAYLOAD_TOO_LARGE,
                body: String::new(),
            });
        }
        self.batches.lock().unwrap().push(gauges.to_vec());
        Ok(())
    }
}

fn projects(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_each_project_listed_exactly_once() {
    let api = FakeClusterManager::default()
        .with_cluster("a", "a-main", vec![pool("default", 10, &["ig-a"])])
        .with_cluster("b", "b-main", vec![pool("default", 4, &["ig-b"])])
        .with_group("ig-a", 3)
        .with_group("ig-b", 1);
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 100);

    let report = collector.run(&projects(&["a", "b"])).await;

    assert_eq!(api.calls_for("a"), 1);
    assert_eq!(api.calls_for("b"), 1);
    assert_eq!(report.projects_scanned, 2);
    assert_eq!(report.metrics.len(), 2);
    assert!(report.summary().is_complete());
}

#[tokio::test]
async fn test_metrics_derived_from_instance_groups() {
    let api = FakeClusterManager::default()
        .with_cluster(
            "p",
            "regional",
            vec![
                pool("autoscaled", 10, &["ig-1", "ig-2"]),
                pool("fixed", 0, &["ig-3"]),
            ],
        )
        .with_group("ig-1", 2)
        .with_group("ig-2", 1)
        .with_group("ig-3", 5);
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 100);

    let report = collector.run(&projects(&["p"])).await;

    let autoscaled = &report.metrics[0];
    assert_eq!(autoscaled.current_node_count, 3);
    assert_eq!(autoscaled.max_node_count, 10);
    assert_eq!(autoscaled.usage_percentage, Some(30.0));

    let fixed = &report.metrics[1];
    assert_eq!(fixed.current_node_count, 5);
    assert_eq!(fixed.usage_percentage, None);

    let sent = sink.sent();
    // 3 gauges + 2 gauges, usage omitted for the fixed pool
    assert_eq!(sent.len(), 5);
    let usage: Vec<&GaugeMetric> = sent
        .iter()
        .filter(|g| g.name == crate::types::METRIC_NODE_USAGE_PERCENT)
        .collect();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].value, 30.0);
    assert_eq!(usage[0].attributes["node_pool_name"], "autoscaled");
    assert_eq!(report.gauges_sent, 5);
}

#[tokio::test]
async fn test_transient_cluster_list_failures_are_retried() {
    let api = FakeClusterManager::default()
        .with_cluster("flaky", "main", vec![pool("default", 10, &["ig"])])
        .with_group("ig", 3)
        .flaky("flaky", 2);
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 100);

    let report = collector.run(&projects(&["flaky"])).await;

    assert_eq!(api.calls_for("flaky"), 3);
    assert!(report.skipped.is_empty());
    let sent = sink.sent();
    assert!(sent.iter().any(|g| g.attributes["project_id"] == "flaky"));
}

#[tokio::test]
async fn test_exhausted_project_does_not_stop_others() {
    let api = FakeClusterManager::default()
        .with_cluster("down", "main", vec![pool("default", 10, &["ig-down"])])
        .with_cluster("up", "main-up", vec![pool("default", 10, &["ig-up"])])
        .with_group("ig-down", 1)
        .with_group("ig-up", 2)
        .flaky("down", 100);
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 100);

    let report = collector.run(&projects(&["down", "up"])).await;

    assert_eq!(api.calls_for("down"), 3);
    assert_eq!(api.calls_for("up"), 1);
    assert_eq!(report.metrics.len(), 1);
    assert_eq!(report.metrics[0].project_id, "up");

    let summary = report.summary();
    assert_eq!(summary.projects_skipped, 1);
    assert_eq!(report.skipped[0].project_id.as_deref(), Some("down"));
    assert!(sink.sent().iter().all(|g| g.attributes["project_id"] == "up"));
}

#[tokio::test]
async fn test_permanent_errors_skip_without_retry() {
    let mut api = FakeClusterManager::default()
        .with_cluster("ok", "main", vec![pool("default", 2, &["ig"])])
        .with_group("ig", 1);
    api.forbidden_projects.push("denied".to_string());
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(5), "us-central1", 100);

    let report = collector.run(&projects(&["denied", "ok"])).await;

    assert_eq!(api.calls_for("denied"), 1);
    assert_eq!(report.summary().projects_skipped, 1);
    assert_eq!(report.metrics.len(), 1);
}

#[tokio::test]
async fn test_cluster_and_pool_failures_are_skipped_individually() {
    let mut api = FakeClusterManager::default()
        .with_cluster("p", "broken", vec![pool("default", 3, &["ig-broken"])])
        .with_cluster("p", "healthy", vec![pool("good", 3, &["ig-good"]), pool("orphan", 3, &["ig-missing"])])
        .with_group("ig-broken", 1)
        .with_group("ig-good", 2);
    api.broken_clusters.push("broken".to_string());
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(2), "us-central1", 100);

    let report = collector.run(&projects(&["p"])).await;

    let broken_calls = api.pool_calls.lock().unwrap().iter().filter(|c| c.as_str() == "broken").count();
    assert_eq!(broken_calls, 2);
    assert_eq!(report.clusters_seen, 2);
    assert_eq!(report.metrics.len(), 1);
    assert_eq!(report.metrics[0].node_pool_name, "good");

    let summary = report.summary();
    assert_eq!(summary.clusters_skipped, 1);
    assert_eq!(summary.node_pools_skipped, 1);
    let orphan = report
        .skipped
        .iter()
        .find(|s| s.stage == SkipStage::CountInstances)
        .unwrap();
    assert_eq!(orphan.cluster_name.as_deref(), Some("healthy"));
    assert_eq!(orphan.node_pool_name.as_deref(), Some("orphan"));
}

#[tokio::test]
async fn test_failed_batch_does_not_stop_later_batches() {
    let api = FakeClusterManager::default()
        .with_cluster("p", "c1", vec![pool("a", 10, &["ig-a"])])
        .with_cluster("p", "c2", vec![pool("b", 10, &["ig-b"])])
        .with_group("ig-a", 1)
        .with_group("ig-b", 2);
    let sink = RecordingSink {
        failing_calls: vec![1],
        ..Default::default()
    };
    // three gauges per pool, so one batch per pool
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 3);

    let report = collector.run(&projects(&["p"])).await;

    let summary = report.summary();
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.node_pools_unsent, 1);
    assert_eq!(summary.batches_sent, 1);
    assert_eq!(summary.gauges_sent, 3);
    assert!(sink.sent().iter().all(|g| g.attributes["cluster_name"] == "c2"));
}

#[tokio::test]
async fn test_nothing_collected_sends_nothing() {
    let api = FakeClusterManager::default();
    let sink = RecordingSink::default();
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 100);

    let report = collector.run(&projects(&["empty"])).await;

    assert_eq!(report.projects_scanned, 1);
    assert_eq!(*sink.calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_dropped_batch_names_each_pool() {
    let api = FakeClusterManager::default()
        .with_cluster("p", "c1", vec![pool("a", 10, &["ig-a"]), pool("b", 4, &["ig-b"])])
        .with_cluster("q", "c2", vec![pool("c", 5, &["ig-c"])])
        .with_group("ig-a", 1)
        .with_group("ig-b", 2)
        .with_group("ig-c", 3);
    let sink = RecordingSink {
        failing_calls: vec![1],
        ..Default::default()
    };
    // first batch holds p/c1/a and p/c1/b, second holds q/c2/c
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 6);

    let report = collector.run(&projects(&["p", "q"])).await;

    let dropped: Vec<_> = report
        .skipped
        .iter()
        .filter(|s| s.stage == SkipStage::SubmitTelemetry)
        .map(|s| {
            (
                s.project_id.as_deref(),
                s.cluster_name.as_deref(),
                s.node_pool_name.as_deref(),
            )
        })
        .collect();
    assert_eq!(
        dropped,
        vec![
            (Some("p"), Some("c1"), Some("a")),
            (Some("p"), Some("c1"), Some("b")),
        ]
    );

    let summary = report.summary();
    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.node_pools_unsent, 2);
    assert_eq!(summary.gauges_sent, 3);
}

#[tokio::test]
async fn test_transient_sink_failure_is_retried() {
    let api = FakeClusterManager::default()
        .with_cluster("p", "c1", vec![pool("a", 10, &["ig-a"])])
        .with_group("ig-a", 4);
    let sink = RecordingSink {
        transient_failures: Mutex::new(1),
        ..Default::default()
    };
    let collector = NodePoolCollector::new(&api, &sink, RetryPolicy::immediate(3), "us-central1", 100);

    let report = collector.run(&projects(&["p"])).await;

    assert_eq!(*sink.calls.lock().unwrap(), 2);
    let sent = sink.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|g| g.attributes["node_pool_name"] == "a"));

    let summary = report.summary();
    assert_eq!(summary.batches_failed, 0);
    assert_eq!(summary.batches_sent, 1);
    assert_eq!(summary.gauges_sent, 3);
    assert!(summary.is_complete());
}
