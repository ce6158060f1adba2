// Node pool metric derivation and gauge encoding
pub mod nodepool;
pub mod gauge;

pub use nodepool::compute_usage_percentage;
pub use gauge::{build_gauges, build_payload, common_attributes};
