// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod parsing;
pub mod retry;
pub mod credentials;
pub mod gke;
pub mod telemetry;
pub mod metrics;
pub mod collector;
pub mod report;
pub mod runner;

// Re-export commonly used items
pub use types::*;
pub use error::{ApiError, ConfigError, Retryable};
pub use config::{load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use parsing::{parse_list, parse_instance_group_url};
pub use retry::{retry, RetryPolicy};
pub use credentials::{CredentialProvider, ServiceAccountCredentials, StaticToken};
pub use gke::{ClusterManager, GkeClient};
pub use telemetry::{NewRelicClient, TelemetrySink};
pub use metrics::*;
pub use collector::NodePoolCollector;
pub use report::{RunReport, RunSummary, SkipStage, SkippedItem};
pub use runner::{run_once, run_with_credentials};
