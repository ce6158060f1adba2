use tracing::debug;

use crate::types::NodePoolMetric;

/// Share of the autoscaling maximum currently in use, in percent.
///
/// Returns `None` when `max` is zero (autoscaling off or unset). Pools running
/// above their per-zone maximum are reported as 100.
pub fn compute_usage_percentage(current: u64, max: u64) -> Option<f64> {
    if max == 0 {
        return None;
    }
    // Multiply first so that e.g. 3/10 yields exactly 30.0
    let pct = (current as f64 * 100.0) / max as f64;
    Some(pct.clamp(0.0, 100.0))
}

impl NodePoolMetric {
    pub fn new(
        project_id: &str,
        cluster_name: &str,
        node_pool_name: &str,
        current_node_count: u64,
        max_node_count: u64,
    ) -> Self {
        if current_node_count > max_node_count && max_node_count > 0 {
            debug!(
                project = project_id,
                cluster = cluster_name,
                node_pool = node_pool_name,
                current_node_count,
                max_node_count,
                "node pool above autoscaling maximum"
            );
        }
        Self {
            project_id: project_id.to_string(),
            cluster_name: cluster_name.to_string(),
            node_pool_name: node_pool_name.to_string(),
            current_node_count,
            max_node_count,
            usage_percentage: compute_usage_percentage(current_node_count, max_node_count),
        }
    }
}
