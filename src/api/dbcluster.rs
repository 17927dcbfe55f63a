//! Database clusters running on DBaaS Kubernetes clusters
//!
//! Each database type is served by its own operator and its own set of
//! endpoints with a slightly different payload. [`DbClusterService`] hides
//! that behind one interface; [`new_db_cluster_service`] picks the adapter
//! for a [`DatabaseType`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::trace;

use super::ApiClient;
use super::kubernetes::{Kubernetes, Operator};
use crate::error::ClientResult;

const BYTES_IN_GB: f64 = 1e9;
const MILLI: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Mysql,
    Mongodb,
}

impl DatabaseType {
    /// Database types in the order their clusters are listed
    pub const ALL: [DatabaseType; 2] = [DatabaseType::Mysql, DatabaseType::Mongodb];

    pub fn label(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "MySQL",
            DatabaseType::Mongodb => "MongoDB",
        }
    }

    /// The operator on a Kubernetes cluster that manages this database type
    pub fn operator<'a>(&self, kubernetes: &'a Kubernetes) -> &'a Operator {
        match self {
            DatabaseType::Mysql => &kubernetes.operators.xtradb,
            DatabaseType::Mongodb => &kubernetes.operators.psmdb,
        }
    }

    fn api_base(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "/v1/management/DBaaS/XtraDBClusters",
            DatabaseType::Mongodb => "/v1/management/DBaaS/PSMDBClusters",
        }
    }

    fn state_prefix(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "XTRA_DB_CLUSTER_STATE_",
            DatabaseType::Mongodb => "PSMDB_CLUSTER_STATE_",
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbClusterStatus {
    Invalid,
    Changing,
    Ready,
    Failed,
    Deleting,
    Suspended,
    Upgrading,
    Unknown,
}

impl DbClusterStatus {
    /// Map a wire state such as `PSMDB_CLUSTER_STATE_READY`; no state at all
    /// means the cluster is still being set up
    pub fn from_state(database_type: DatabaseType, state: Option<&str>) -> Self {
        let Some(state) = state else {
            return DbClusterStatus::Changing;
        };

        match state.strip_prefix(database_type.state_prefix()) {
            Some("INVALID") => DbClusterStatus::Invalid,
            Some("CHANGING") => DbClusterStatus::Changing,
            Some("READY") => DbClusterStatus::Ready,
            Some("FAILED") => DbClusterStatus::Failed,
            Some("DELETING") => DbClusterStatus::Deleting,
            Some("PAUSED") => DbClusterStatus::Suspended,
            Some("UPGRADING") => DbClusterStatus::Upgrading,
            _ => DbClusterStatus::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DbClusterStatus::Invalid => "Invalid",
            DbClusterStatus::Changing => "Pending",
            DbClusterStatus::Ready => "Active",
            DbClusterStatus::Failed => "Failed",
            DbClusterStatus::Deleting => "Deleting",
            DbClusterStatus::Suspended => "Paused",
            DbClusterStatus::Upgrading => "Upgrading",
            DbClusterStatus::Unknown => "Unknown",
        }
    }
}

/// Cluster model shared by all database types
#[derive(Debug, Clone, PartialEq)]
pub struct DbCluster {
    pub cluster_name: String,
    pub kubernetes_cluster_name: String,
    pub database_type: DatabaseType,
    pub cluster_size: u32,
    /// Memory per node in GB
    pub memory: f64,
    /// CPU per node in cores
    pub cpu: f64,
    /// Disk per node in GB
    pub disk: f64,
    pub status: DbClusterStatus,
    pub message: Option<String>,
    pub finished_steps: Option<u32>,
    pub total_steps: Option<u32>,
}

/// int64 fields arrive as JSON strings, but tolerate plain numbers as well
fn int64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }

    match Int64::deserialize(deserializer)? {
        Int64::Number(n) => Ok(n),
        Int64::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ComputeResources {
    #[serde(default)]
    pub cpu_m: u64,
    #[serde(default, deserialize_with = "int64")]
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NodeParams {
    #[serde(default)]
    pub compute_resources: ComputeResources,
    #[serde(default, deserialize_with = "int64")]
    pub disk_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Operation {
    pub message: Option<String>,
    pub finished_steps: Option<u32>,
    pub total_steps: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct XtraDbParams {
    #[serde(default)]
    pub cluster_size: u32,
    #[serde(default)]
    pub pxc: NodeParams,
    #[serde(default)]
    pub proxysql: NodeParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct XtraDbClusterPayload {
    pub name: String,
    pub state: Option<String>,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub params: XtraDbParams,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PsmdbParams {
    #[serde(default)]
    pub cluster_size: u32,
    #[serde(default)]
    pub replicaset: NodeParams,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PsmdbClusterPayload {
    pub name: String,
    pub state: Option<String>,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub params: PsmdbParams,
}

#[derive(Debug, Clone, Deserialize)]
struct ClusterListResponse<T> {
    #[serde(default = "Vec::new")]
    clusters: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
struct ClusterRef<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    kubernetes_cluster_name: &'a str,
}

/// Per-database-type adapter between the DBaaS endpoints and [`DbCluster`]
#[async_trait]
pub trait DbClusterService: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn client(&self) -> &ApiClient;

    /// List the clusters of this type running on `kubernetes`
    async fn get_db_clusters(&self, kubernetes: &Kubernetes) -> ClientResult<Vec<DbCluster>>;

    async fn delete_db_cluster(&self, cluster: &DbCluster) -> ClientResult<()> {
        let path = format!("{}/Delete", self.database_type().api_base());
        self.client()
            .post_unit(
                &path,
                &ClusterRef {
                    name: Some(cluster.cluster_name.as_str()),
                    kubernetes_cluster_name: &cluster.kubernetes_cluster_name,
                },
            )
            .await
    }

    async fn restart_db_cluster(&self, cluster: &DbCluster) -> ClientResult<()> {
        let path = format!("{}/Restart", self.database_type().api_base());
        self.client()
            .post_unit(
                &path,
                &ClusterRef {
                    name: Some(cluster.cluster_name.as_str()),
                    kubernetes_cluster_name: &cluster.kubernetes_cluster_name,
                },
            )
            .await
    }
}

async fn list_payloads<T>(
    client: &ApiClient,
    database_type: DatabaseType,
    kubernetes: &Kubernetes,
) -> ClientResult<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    let path = format!("{}/List", database_type.api_base());
    trace!(
        "listing {database_type} clusters on {}",
        kubernetes.kubernetes_cluster_name
    );

    let response: ClusterListResponse<T> = client
        .post(
            &path,
            &ClusterRef {
                name: None,
                kubernetes_cluster_name: &kubernetes.kubernetes_cluster_name,
            },
        )
        .await?;
    Ok(response.clusters)
}

#[derive(Debug, Clone)]
pub struct XtraDbClusterService {
    client: ApiClient,
}

impl XtraDbClusterService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn to_model(payload: XtraDbClusterPayload, kubernetes_cluster_name: &str) -> DbCluster {
        let pxc = &payload.params.pxc;
        DbCluster {
            cluster_name: payload.name,
            kubernetes_cluster_name: kubernetes_cluster_name.to_string(),
            database_type: DatabaseType::Mysql,
            cluster_size: payload.params.cluster_size,
            memory: pxc.compute_resources.memory_bytes as f64 / BYTES_IN_GB,
            cpu: pxc.compute_resources.cpu_m as f64 / MILLI,
            disk: pxc.disk_size as f64 / BYTES_IN_GB,
            status: DbClusterStatus::from_state(DatabaseType::Mysql, payload.state.as_deref()),
            message: payload.operation.message,
            finished_steps: payload.operation.finished_steps,
            total_steps: payload.operation.total_steps,
        }
    }
}

#[async_trait]
impl DbClusterService for XtraDbClusterService {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mysql
    }

    fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn get_db_clusters(&self, kubernetes: &Kubernetes) -> ClientResult<Vec<DbCluster>> {
        let payloads: Vec<XtraDbClusterPayload> =
            list_payloads(&self.client, DatabaseType::Mysql, kubernetes).await?;
        Ok(payloads
            .into_iter()
            .map(|p| Self::to_model(p, &kubernetes.kubernetes_cluster_name))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct PsmdbClusterService {
    client: ApiClient,
}

impl PsmdbClusterService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn to_model(payload: PsmdbClusterPayload, kubernetes_cluster_name: &str) -> DbCluster {
        let replicaset = &payload.params.replicaset;
        DbCluster {
            cluster_name: payload.name,
            kubernetes_cluster_name: kubernetes_cluster_name.to_string(),
            database_type: DatabaseType::Mongodb,
            cluster_size: payload.params.cluster_size,
            memory: replicaset.compute_resources.memory_bytes as f64 / BYTES_IN_GB,
            cpu: replicaset.compute_resources.cpu_m as f64 / MILLI,
            disk: replicaset.disk_size as f64 / BYTES_IN_GB,
            status: DbClusterStatus::from_state(DatabaseType::Mongodb, payload.state.as_deref()),
            message: payload.operation.message,
            finished_steps: payload.operation.finished_steps,
            total_steps: payload.operation.total_steps,
        }
    }
}

#[async_trait]
impl DbClusterService for PsmdbClusterService {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mongodb
    }

    fn client(&self) -> &ApiClient {
        &self.client
    }

    async fn get_db_clusters(&self, kubernetes: &Kubernetes) -> ClientResult<Vec<DbCluster>> {
        let payloads: Vec<PsmdbClusterPayload> =
            list_payloads(&self.client, DatabaseType::Mongodb, kubernetes).await?;
        Ok(payloads
            .into_iter()
            .map(|p| Self::to_model(p, &kubernetes.kubernetes_cluster_name))
            .collect())
    }
}

pub fn new_db_cluster_service(
    database_type: DatabaseType,
    client: ApiClient,
) -> Arc<dyn DbClusterService> {
    match database_type {
        DatabaseType::Mysql => Arc::new(XtraDbClusterService::new(client)),
        DatabaseType::Mongodb => Arc::new(PsmdbClusterService::new(client)),
    }
}
