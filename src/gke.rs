use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::credentials::CredentialProvider;
use crate::error::ApiError;
use crate::parsing::parse_instance_group_url;
use crate::types::{Cluster, NodePool};

/// Read access to clusters, node pools and their instance groups.
#[async_trait]
pub trait ClusterManager: Send + Sync {
    async fn list_clusters(&self, project: &str, region: &str) -> Result<Vec<Cluster>, ApiError>;

    async fn list_node_pools(
        &self,
        project: &str,
        region: &str,
        cluster: &str,
    ) -> Result<Vec<NodePool>, ApiError>;

    /// Number of instances in a managed instance group, given its URL.
    async fn count_instances(&self, instance_group_url: &str) -> Result<u64, ApiError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListClustersResponse {
    #[serde(default)]
    clusters: Vec<ClusterResource>,
    #[serde(default)]
    missing_zones: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterResource {
    name: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListNodePoolsResponse {
    #[serde(default)]
    node_pools: Vec<NodePoolResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodePoolResource {
    name: String,
    #[serde(default)]
    autoscaling: Option<AutoscalingResource>,
    #[serde(default)]
    instance_group_urls: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoscalingResource {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    max_node_count: i64,
    #[serde(default)]
    total_max_node_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceListPage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl From<NodePoolResource> for NodePool {
    fn from(res: NodePoolResource) -> Self {
        let max_node_count = res
            .autoscaling
            .as_ref()
            .filter(|a| a.enabled)
            .map(|a| {
                if a.max_node_count > 0 {
                    a.max_node_count
                } else {
                    a.total_max_node_count
                }
            })
            .unwrap_or(0)
            .max(0) as u64;
        NodePool {
            name: res.name,
            max_node_count,
            instance_group_urls: res.instance_group_urls,
        }
    }
}

/// REST client for the GKE (container.googleapis.com) and Compute Engine APIs.
pub struct GkeClient {
    http: reqwest::Client,
    gke_endpoint: String,
    compute_endpoint: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl GkeClient {
    pub fn new(
        gke_endpoint: &str,
        compute_endpoint: &str,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::transport("gke"))?;
        Ok(Self {
            http,
            gke_endpoint: gke_endpoint.trim_end_matches('/').to_string(),
            compute_endpoint: compute_endpoint.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        service: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let token = self.credentials.access_token().await?;
        let res = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(ApiError::transport(service))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(ApiError::Status { service, status, body });
        }
        res.json::<T>().await.map_err(ApiError::body(service))
    }
}

#[async_trait]
impl ClusterManager for GkeClient {
    async fn list_clusters(&self, project: &str, region: &str) -> Result<Vec<Cluster>, ApiError> {
        let url = format!(
            "{}/v1/projects/{}/locations/{}/clusters",
            self.gke_endpoint, project, region
        );
        let list: ListClustersResponse = self.send_json("gke", self.http.get(&url)).await?;
        if !list.missing_zones.is_empty() {
            debug!(project, region, missing_zones = ?list.missing_zones, "cluster list is missing zones");
        }
        Ok(list
            .clusters
            .into_iter()
            .map(|c| Cluster {
                name: c.name,
                location: c.location,
                status: c.status,
            })
            .collect())
    }

    async fn list_node_pools(
        &self,
        project: &str,
        region: &str,
        cluster: &str,
    ) -> Result<Vec<NodePool>, ApiError> {
        let url = format!(
            "{}/v1/projects/{}/locations/{}/clusters/{}/nodePools",
            self.gke_endpoint, project, region, cluster
        );
        let list: ListNodePoolsResponse = self.send_json("gke", self.http.get(&url)).await?;
        Ok(list.node_pools.into_iter().map(NodePool::from).collect())
    }

    async fn count_instances(&self, instance_group_url: &str) -> Result<u64, ApiError> {
        let group = parse_instance_group_url(instance_group_url).ok_or_else(|| {
            ApiError::InvalidInput(format!("unrecognised instance group URL: {}", instance_group_url))
        })?;
        let url = format!(
            "{}/compute/v1/projects/{}/zones/{}/instanceGroups/{}/listInstances",
            self.compute_endpoint, group.project, group.zone, group.name
        );

        let mut total = 0u64;
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .post(&url)
                .json(&serde_json::json!({ "instanceState": "ALL" }));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: InstanceListPage = self.send_json("compute", request).await?;
            total += page.items.len() as u64;
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(total)
    }
}
