//! Kubernetes API access.
//!
//! Only the four calls the engine needs: create a Job, PersistentVolume or
//! PersistentVolumeClaim, and list pods in a namespace. Responses are passed back
//! untouched; callers decide what a failure means.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::phase::PodSummary;
use crate::io::config::ClusterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Job,
    PersistentVolume,
    PersistentVolumeClaim,
}

impl ResourceKind {
    /// Collection path for creating resources of this kind.
    pub fn collection_path(self, namespace: &str) -> String {
        match self {
            ResourceKind::Job => format!("/apis/batch/v1/namespaces/{namespace}/jobs"),
            ResourceKind::PersistentVolume => "/api/v1/persistentvolumes".to_string(),
            ResourceKind::PersistentVolumeClaim => {
                format!("/api/v1/namespaces/{namespace}/persistentvolumeclaims")
            }
        }
    }

    pub fn is_namespaced(self) -> bool {
        !matches!(self, ResourceKind::PersistentVolume)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Job => "Job",
            ResourceKind::PersistentVolume => "PersistentVolume",
            ResourceKind::PersistentVolumeClaim => "PersistentVolumeClaim",
        };
        f.write_str(name)
    }
}

/// Identity of a created resource, as reported by the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The API server answered with a non-success status.
    #[error("cluster API returned {status} ({reason}): {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered 2xx with a body we cannot read.
    #[error("malformed API response: {0}")]
    Malformed(String),

    #[error("cluster client configuration: {0}")]
    Config(String),
}

pub trait ClusterApi {
    /// Namespace used when a manifest does not name one.
    fn namespace(&self) -> &str;

    fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<Value, ApiError>;

    fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, ApiError>;
}

/// Blocking HTTP client against a real API server.
#[derive(Debug)]
pub struct HttpClusterApi {
    http: Client,
    base_url: String,
    namespace: String,
}

impl HttpClusterApi {
    /// Build a client from configuration, falling back to in-cluster discovery.
    pub fn from_config(cfg: &ClusterConfig) -> Result<Self, ApiError> {
        let base_url = match &cfg.api_server {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => in_cluster_url()?,
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if cfg.token_path.exists() {
            let token = fs::read_to_string(&cfg.token_path).map_err(|err| {
                ApiError::Config(format!("read token {}: {err}", cfg.token_path.display()))
            })?;
            let value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| ApiError::Config("invalid bearer token".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(format!("playbook/{}", env!("CARGO_PKG_VERSION")));
        if cfg.ca_path.exists() {
            let pem = fs::read(&cfg.ca_path).map_err(|err| {
                ApiError::Config(format!("read CA {}: {err}", cfg.ca_path.display()))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        debug!(base_url = %base_url, namespace = %cfg.namespace, "cluster client ready");
        Ok(Self {
            http: builder.build()?,
            base_url,
            namespace: cfg.namespace.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn read_json(response: reqwest::blocking::Response) -> Result<Value, ApiError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .map_err(|err| ApiError::Malformed(err.to_string()));
        }
        let body = response.text().unwrap_or_default();
        let reason = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("reason").and_then(Value::as_str).map(str::to_string))
            .or_else(|| status.canonical_reason().map(str::to_string))
            .unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            reason,
            body,
        })
    }
}

fn in_cluster_url() -> Result<String, ApiError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
        ApiError::Config(
            "cluster.api_server is unset and KUBERNETES_SERVICE_HOST is not available".to_string(),
        )
    })?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
    if host.contains(':') {
        Ok(format!("https://[{host}]:{port}"))
    } else {
        Ok(format!("https://{host}:{port}"))
    }
}

impl ClusterApi for HttpClusterApi {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    #[instrument(skip_all, fields(kind = %kind, namespace = %namespace))]
    fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<Value, ApiError> {
        let url = self.url(&kind.collection_path(namespace));
        debug!(url = %url, "creating resource");
        let response = self.http.post(url).json(manifest).send()?;
        Self::read_json(response)
    }

    #[instrument(skip_all, fields(namespace = %namespace))]
    fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, ApiError> {
        let url = self.url(&format!("/api/v1/namespaces/{namespace}/pods"));
        let response = self.http.get(url).send()?;
        parse_pod_list(&Self::read_json(response)?)
    }
}

/// Connects on first use, so runs that never touch the cluster never need one.
#[derive(Debug)]
pub struct LazyClusterApi {
    config: ClusterConfig,
    client: OnceCell<HttpClusterApi>,
}

impl LazyClusterApi {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Result<&HttpClusterApi, ApiError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = HttpClusterApi::from_config(&self.config)?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl ClusterApi for LazyClusterApi {
    fn namespace(&self) -> &str {
        &self.config.namespace
    }

    fn create(
        &self,
        kind: ResourceKind,
        namespace: &str,
        manifest: &Value,
    ) -> Result<Value, ApiError> {
        self.client()?.create(kind, namespace, manifest)
    }

    fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, ApiError> {
        self.client()?.list_pods(namespace)
    }
}

/// Decode a `v1.PodList` into summaries.
pub fn parse_pod_list(list: &Value) -> Result<Vec<PodSummary>, ApiError> {
    let items = list
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Malformed("pod list without `items`".to_string()))?;
    items
        .iter()
        .map(|item| {
            let metadata = item.get("metadata");
            let name = metadata
                .and_then(|m| m.get("name"))
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::Malformed("pod without metadata.name".to_string()))?;
            let labels: BTreeMap<String, String> = metadata
                .and_then(|m| m.get("labels"))
                .and_then(Value::as_object)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            let phase = item
                .get("status")
                .and_then(|s| s.get("phase"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(PodSummary {
                name: name.to_string(),
                labels,
                phase,
            })
        })
        .collect()
}
