//! Periodic listing of database clusters across Kubernetes clusters
//!
//! Every refresh fans out one list request per (database type, Kubernetes
//! cluster) pair whose operator is healthy, then merges what came back in
//! database-type order, Kubernetes order within a type. A pair whose request
//! failed contributes no clusters.
//!
//! ```text
//! DbClusterWatcher
//!   ├── PollerHandle ── tick ── DbClusterSource::produce ── fan_out ── ClusterList
//!   └── Snapshot ◄──────────────── PollEvent ─────────────────────────────┘
//! ```

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::api::ApiClient;
use crate::api::dbcluster::{DatabaseType, DbCluster, DbClusterService, new_db_cluster_service};
use crate::api::kubernetes::{Kubernetes, OperatorStatus, list_kubernetes};
use crate::config::Config;
use crate::fanout::{FailurePolicy, fan_out};
use crate::poller::{PollEvent, PollerHandle, Producer, ResultOrdering, Snapshot, TickPolicy};

/// One list request: a database type on one Kubernetes cluster
#[derive(Clone)]
pub struct ClusterGroup {
    service: Arc<dyn DbClusterService>,
    kubernetes: Kubernetes,
}

impl ClusterGroup {
    pub fn database_type(&self) -> DatabaseType {
        self.service.database_type()
    }

    pub fn kubernetes_cluster_name(&self) -> &str {
        &self.kubernetes.kubernetes_cluster_name
    }
}

impl fmt::Debug for ClusterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {}",
            self.database_type(),
            self.kubernetes_cluster_name()
        )
    }
}

/// A list request that failed, kept only under [`FailurePolicy::Report`]
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFailure {
    pub database_type: DatabaseType,
    pub kubernetes_cluster_name: String,
    pub error: String,
}

/// Result of one refresh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterList {
    pub clusters: Vec<DbCluster>,
    pub failures: Vec<ClusterFailure>,
}

/// Where the Kubernetes clusters to query come from
#[derive(Debug, Clone)]
pub enum KubernetesSource {
    /// A list fixed at construction time
    Fixed(Vec<Kubernetes>),
    /// Listed from the server on every refresh
    Server,
}

/// Producer listing all database clusters on every call
pub struct DbClusterSource {
    client: ApiClient,
    services: Vec<Arc<dyn DbClusterService>>,
    kubernetes: KubernetesSource,
    policy: FailurePolicy,
}

impl DbClusterSource {
    /// Source covering every database type, in [`DatabaseType::ALL`] order
    pub fn new(client: ApiClient, kubernetes: KubernetesSource, policy: FailurePolicy) -> Self {
        let services = DatabaseType::ALL
            .into_iter()
            .map(|database_type| new_db_cluster_service(database_type, client.clone()))
            .collect();

        Self {
            client,
            services,
            kubernetes,
            policy,
        }
    }

    /// Pairs to query: a Kubernetes cluster only counts for a database type
    /// if the matching operator reports OK
    pub fn groups(&self, kubernetes: &[Kubernetes]) -> Vec<ClusterGroup> {
        self.services
            .iter()
            .flat_map(|service| {
                kubernetes
                    .iter()
                    .filter(|k| service.database_type().operator(k).status == OperatorStatus::Ok)
                    .map(|k| ClusterGroup {
                        service: service.clone(),
                        kubernetes: k.clone(),
                    })
            })
            .collect()
    }

    async fn kubernetes(&self) -> Result<Vec<Kubernetes>> {
        match &self.kubernetes {
            KubernetesSource::Fixed(list) => Ok(list.clone()),
            KubernetesSource::Server => list_kubernetes(&self.client)
                .await
                .context("failed to list kubernetes clusters"),
        }
    }

    /// List the clusters of the given Kubernetes clusters
    #[instrument(skip_all, fields(kubernetes = kubernetes.len()))]
    pub async fn list_on(&self, kubernetes: &[Kubernetes]) -> ClusterList {
        let groups = self.groups(kubernetes);
        debug!("querying {} cluster groups", groups.len());

        let aggregate = fan_out(
            groups,
            |group: ClusterGroup| async move {
                group.service.get_db_clusters(&group.kubernetes).await
            },
            self.policy,
        )
        .await;

        ClusterList {
            clusters: aggregate.items,
            failures: aggregate
                .failures
                .into_iter()
                .map(|failure| ClusterFailure {
                    database_type: failure.group.database_type(),
                    kubernetes_cluster_name: failure.group.kubernetes.kubernetes_cluster_name,
                    error: failure.error,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Producer for DbClusterSource {
    type Output = ClusterList;

    async fn produce(&self) -> Result<ClusterList> {
        let kubernetes = self.kubernetes().await?;
        Ok(self.list_on(&kubernetes).await)
    }
}

/// Keeps an up to date cluster list by polling a [`DbClusterSource`]
pub struct DbClusterWatcher {
    handle: PollerHandle<ClusterList>,
    snapshot: Snapshot<ClusterList>,
    follower: JoinHandle<()>,
}

impl DbClusterWatcher {
    pub fn spawn(source: DbClusterSource, config: &Config) -> Result<Self> {
        Self::spawn_with(
            source,
            config.poll_interval(),
            config.tick_policy,
            config.result_ordering,
        )
    }

    pub fn spawn_with(
        source: DbClusterSource,
        period: std::time::Duration,
        tick_policy: TickPolicy,
        ordering: ResultOrdering,
    ) -> Result<Self> {
        let (handle, actor) = PollerHandle::new("db-clusters", source, period, tick_policy)?;
        let snapshot = Snapshot::new(ordering);
        let follower = snapshot.follow(&handle);
        tokio::spawn(actor.run());

        Ok(Self {
            handle,
            snapshot,
            follower,
        })
    }

    /// Last successfully listed clusters, empty while loading
    pub async fn clusters(&self) -> Vec<DbCluster> {
        self.snapshot
            .value()
            .await
            .map(|list| list.clusters)
            .unwrap_or_default()
    }

    pub async fn is_loading(&self) -> bool {
        self.snapshot.is_loading().await
    }

    pub fn snapshot(&self) -> &Snapshot<ClusterList> {
        &self.snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent<ClusterList>> {
        self.handle.subscribe()
    }

    /// Refresh right away instead of waiting for the next tick
    pub async fn refresh(&self) -> Result<ClusterList> {
        self.snapshot.mark_loading().await;
        self.handle.poll_now().await
    }

    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        drop(self.handle);
        // the follower ends once in-flight calls settle and the channel closes
        let _ = self.follower.await;
        Ok(())
    }
}
