use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::parsing::parse_list;
use crate::types::{Config, Endpoints, LogFormat, RetrySettings};

pub const DEFAULT_GKE_ENDPOINT: &str = "https://container.googleapis.com";
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com";
pub const NEW_RELIC_US_METRIC_URL: &str = "https://metric-api.newrelic.com/metric/v1";
pub const NEW_RELIC_EU_METRIC_URL: &str = "https://metric-api.eu.newrelic.com/metric/v1";

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config, ConfigError> {
    let raw_projects = required(env, "GCP_PROJECT_IDS")?;
    let project_ids = parse_list(&raw_projects);
    if project_ids.is_empty() {
        return Err(ConfigError::Empty("GCP_PROJECT_IDS"));
    }

    let region = required(env, "GCP_REGION")?;
    let new_relic_api_key = required(env, "NEW_RELIC_API_KEY")?;
    let credentials_path = required(env, "GOOGLE_APPLICATION_CREDENTIALS")?;

    let max_attempts: u32 = optional_parsed(env, "RETRY_ATTEMPTS", 5)?;
    if max_attempts == 0 {
        return Err(invalid("RETRY_ATTEMPTS", "0", "must be at least 1"));
    }
    let base_delay_ms: u64 = optional_parsed(env, "RETRY_BASE_DELAY_MS", 1_000)?;
    let max_delay_ms: u64 = optional_parsed(env, "RETRY_MAX_DELAY_MS", 16_000)?;
    let jitter_ms: u64 = optional_parsed(env, "RETRY_JITTER_MS", 250)?;
    if max_delay_ms < base_delay_ms {
        return Err(invalid(
            "RETRY_MAX_DELAY_MS",
            &max_delay_ms.to_string(),
            "must not be smaller than RETRY_BASE_DELAY_MS",
        ));
    }

    let http_timeout_secs: u64 = optional_parsed(env, "HTTP_TIMEOUT_SECS", 30)?;
    if http_timeout_secs == 0 {
        return Err(invalid("HTTP_TIMEOUT_SECS", "0", "must be at least 1"));
    }

    let telemetry_batch_size: usize = optional_parsed(env, "TELEMETRY_BATCH_SIZE", 1_000)?;
    if telemetry_batch_size == 0 {
        return Err(invalid("TELEMETRY_BATCH_SIZE", "0", "must be at least 1"));
    }

    let new_relic_metrics = match optional(env, "NEW_RELIC_METRIC_API_URL") {
        Some(url) => url,
        None => new_relic_region_url(optional(env, "NEW_RELIC_REGION").as_deref())?.to_string(),
    };

    let endpoints = Endpoints {
        gke: optional(env, "GKE_API_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_GKE_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string(),
        compute: optional(env, "COMPUTE_API_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_COMPUTE_ENDPOINT.to_string())
            .trim_end_matches('/')
            .to_string(),
        new_relic_metrics,
    };

    let log_format = match optional(env, "LOG_FORMAT").as_deref() {
        None => LogFormat::Text,
        Some(v) if v.eq_ignore_ascii_case("text") => LogFormat::Text,
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        Some(other) => return Err(invalid("LOG_FORMAT", other, "expected 'text' or 'json'")),
    };

    Ok(Config {
        project_ids,
        region,
        new_relic_api_key,
        credentials_path,
        retry: RetrySettings {
            max_attempts,
            base_delay: Duration::from_millis(base_delay_ms),
            max_delay: Duration::from_millis(max_delay_ms),
            jitter: Duration::from_millis(jitter_ms),
        },
        http_timeout: Duration::from_secs(http_timeout_secs),
        endpoints,
        telemetry_batch_size,
        log_format,
    })
}

fn new_relic_region_url(region: Option<&str>) -> Result<&'static str, ConfigError> {
    match region {
        None => Ok(NEW_RELIC_US_METRIC_URL),
        Some(r) if r.eq_ignore_ascii_case("us") => Ok(NEW_RELIC_US_METRIC_URL),
        Some(r) if r.eq_ignore_ascii_case("eu") => Ok(NEW_RELIC_EU_METRIC_URL),
        Some(other) => Err(invalid("NEW_RELIC_REGION", other, "expected 'US' or 'EU'")),
    }
}

fn required<E: EnvironmentProvider>(env: &E, key: &'static str) -> Result<String, ConfigError> {
    let value = env.get_var(key).ok_or(ConfigError::Missing(key))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty(key));
    }
    Ok(value.to_string())
}

/// Unset and blank are treated the same.
fn optional<E: EnvironmentProvider>(env: &E, key: &str) -> Option<String> {
    env.get_var(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn optional_parsed<E, T>(env: &E, key: &'static str, default: T) -> Result<T, ConfigError>
where
    E: EnvironmentProvider,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(env, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
