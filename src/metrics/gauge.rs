use std::collections::BTreeMap;

use crate::types::{
    CommonBlock, GaugeMetric, MetricPayload, NodePoolMetric, METRIC_CURRENT_NODE_COUNT,
    METRIC_MAX_NODE_COUNT, METRIC_NODE_USAGE_PERCENT,
};

const GAUGE: &str = "gauge";

/// Encode node pool metrics as gauges. The usage gauge is left out for pools
/// whose percentage is undefined.
pub fn build_gauges(metrics: &[NodePoolMetric], region: &str, timestamp_ms: i64) -> Vec<GaugeMetric> {
    let mut gauges = Vec::with_capacity(metrics.len() * 3);
    for m in metrics {
        let attributes = pool_attributes(m, region);

        gauges.push(GaugeMetric {
            name: METRIC_CURRENT_NODE_COUNT.to_string(),
            kind: GAUGE,
            value: m.current_node_count as f64,
            timestamp_ms,
            attributes: attributes.clone(),
        });

        gauges.push(GaugeMetric {
            name: METRIC_MAX_NODE_COUNT.to_string(),
            kind: GAUGE,
            value: m.max_node_count as f64,
            timestamp_ms,
            attributes: attributes.clone(),
        });

        if let Some(pct) = m.usage_percentage {
            gauges.push(GaugeMetric {
                name: METRIC_NODE_USAGE_PERCENT.to_string(),
                kind: GAUGE,
                value: pct,
                timestamp_ms,
                attributes,
            });
        }
    }
    gauges
}

fn pool_attributes(m: &NodePoolMetric, region: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    attributes.insert("project_id".to_string(), m.project_id.clone());
    attributes.insert("region".to_string(), region.to_string());
    attributes.insert("cluster_name".to_string(), m.cluster_name.clone());
    attributes.insert("node_pool_name".to_string(), m.node_pool_name.clone());
    attributes
}

pub fn common_attributes() -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    attributes.insert("collector.name".to_string(), env!("CARGO_PKG_NAME").to_string());
    attributes.insert("collector.version".to_string(), env!("CARGO_PKG_VERSION").to_string());
    attributes
}

/// New Relic Metric API body: an array holding one block of metrics.
pub fn build_payload(gauges: &[GaugeMetric]) -> Vec<MetricPayload<'_>> {
    vec![MetricPayload {
        common: CommonBlock {
            attributes: common_attributes(),
        },
        metrics: gauges,
    }]
}
