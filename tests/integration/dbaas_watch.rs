//! Cluster listing across Kubernetes clusters
//!
//! These tests cover the fan-out from the outside:
//! - merge order (database type first, Kubernetes cluster second)
//! - per-group failures under both failure policies
//! - operator filtering
//! - the watcher snapshot

use std::time::Duration;

use pmm_console::api::dbcluster::{DatabaseType, DbClusterStatus};
use pmm_console::api::kubernetes::Kubernetes;
use pmm_console::dbaas::{DbClusterSource, DbClusterWatcher, KubernetesSource};
use pmm_console::fanout::FailurePolicy;
use pmm_console::poller::{ResultOrdering, TickPolicy};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn names(list: &pmm_console::dbaas::ClusterList) -> Vec<&str> {
    list.clusters
        .iter()
        .map(|c| c.cluster_name.as_str())
        .collect()
}

async fn two_kubernetes_server() -> MockServer {
    let mock_server = MockServer::start().await;

    mount_clusters(&mock_server, XTRADB_LIST, "k1", vec![xtradb_cluster_json("mysql-a")]).await;
    mount_clusters(
        &mock_server,
        XTRADB_LIST,
        "k2",
        vec![xtradb_cluster_json("mysql-b"), xtradb_cluster_json("mysql-c")],
    )
    .await;
    mount_clusters(&mock_server, PSMDB_LIST, "k1", vec![psmdb_cluster_json("mongo-a")]).await;
    mount_clusters(&mock_server, PSMDB_LIST, "k2", vec![]).await;

    mock_server
}

#[tokio::test]
async fn test_clusters_merged_in_group_order() {
    let mock_server = two_kubernetes_server().await;
    let kubernetes = vec![Kubernetes::healthy("k1"), Kubernetes::healthy("k2")];

    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Fixed(kubernetes.clone()),
        FailurePolicy::Drop,
    );
    let list = source.list_on(&kubernetes).await;

    assert_eq!(names(&list), vec!["mysql-a", "mysql-b", "mysql-c", "mongo-a"]);
    assert!(list.failures.is_empty());

    let mongo = &list.clusters[3];
    assert_eq!(mongo.database_type, DatabaseType::Mongodb);
    assert_eq!(mongo.kubernetes_cluster_name, "k1");
    assert_eq!(mongo.status, DbClusterStatus::Changing);
    assert_eq!(mongo.finished_steps, Some(2));
    assert_eq!(mongo.memory, 4.0);
    assert_eq!(mongo.cpu, 2.0);
}

#[tokio::test]
async fn test_failed_group_contributes_nothing() {
    let mock_server = MockServer::start().await;
    mount_clusters(&mock_server, XTRADB_LIST, "k1", vec![xtradb_cluster_json("mysql-a")]).await;
    mount_cluster_error(&mock_server, XTRADB_LIST, "k2", 500).await;
    mount_clusters(&mock_server, PSMDB_LIST, "k1", vec![]).await;
    mount_clusters(&mock_server, PSMDB_LIST, "k2", vec![psmdb_cluster_json("mongo-b")]).await;

    let kubernetes = vec![Kubernetes::healthy("k1"), Kubernetes::healthy("k2")];
    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Fixed(kubernetes.clone()),
        FailurePolicy::Drop,
    );
    let list = source.list_on(&kubernetes).await;

    assert_eq!(names(&list), vec!["mysql-a", "mongo-b"]);
    assert!(list.failures.is_empty(), "Drop never reports failures");
}

#[tokio::test]
async fn test_report_policy_names_failed_groups() {
    let mock_server = MockServer::start().await;
    mount_cluster_error(&mock_server, XTRADB_LIST, "k1", 503).await;
    mount_clusters(&mock_server, XTRADB_LIST, "k2", vec![xtradb_cluster_json("mysql-b")]).await;
    mount_clusters(&mock_server, PSMDB_LIST, "k1", vec![]).await;
    mount_cluster_error(&mock_server, PSMDB_LIST, "k2", 500).await;

    let kubernetes = vec![Kubernetes::healthy("k1"), Kubernetes::healthy("k2")];
    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Fixed(kubernetes.clone()),
        FailurePolicy::Report,
    );
    let list = source.list_on(&kubernetes).await;

    assert_eq!(names(&list), vec!["mysql-b"]);

    let failed: Vec<(DatabaseType, &str)> = list
        .failures
        .iter()
        .map(|f| (f.database_type, f.kubernetes_cluster_name.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![(DatabaseType::Mysql, "k1"), (DatabaseType::Mongodb, "k2")]
    );
    assert!(list.failures[0].error.contains("503"));
}

#[tokio::test]
async fn test_unhealthy_operator_is_not_queried() {
    let mock_server = MockServer::start().await;
    mount_clusters(&mock_server, XTRADB_LIST, "k1", vec![xtradb_cluster_json("mysql-a")]).await;

    Mock::given(method("POST"))
        .and(path(PSMDB_LIST))
        .and(body_partial_json(json!({ "kubernetes_cluster_name": "k1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "clusters": [] })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let kubernetes: Kubernetes = serde_json::from_value(kubernetes_json(
        "k1",
        "OPERATORS_STATUS_OK",
        "OPERATORS_STATUS_NOT_INSTALLED",
    ))
    .unwrap();

    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Fixed(vec![kubernetes.clone()]),
        FailurePolicy::Drop,
    );
    let list = source.list_on(&[kubernetes]).await;

    assert_eq!(names(&list), vec!["mysql-a"]);
}

#[tokio::test]
async fn test_no_kubernetes_clusters_means_empty_list() {
    let mock_server = MockServer::start().await;

    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Fixed(vec![]),
        FailurePolicy::Report,
    );
    let list = source.list_on(&[]).await;

    assert!(list.clusters.is_empty());
    assert!(list.failures.is_empty());
}

#[tokio::test]
async fn test_watcher_keeps_snapshot_current() {
    let mock_server = two_kubernetes_server().await;
    mount_kubernetes(
        &mock_server,
        vec![healthy_kubernetes_json("k1"), healthy_kubernetes_json("k2")],
    )
    .await;

    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Server,
        FailurePolicy::Drop,
    );
    let watcher = DbClusterWatcher::spawn_with(
        source,
        Duration::from_secs(3600),
        TickPolicy::Serialize,
        ResultOrdering::NewestIssued,
    )
    .unwrap();

    let refreshed = watcher.refresh().await.unwrap();
    assert_eq!(names(&refreshed), vec!["mysql-a", "mysql-b", "mysql-c", "mongo-a"]);

    tokio::time::timeout(Duration::from_secs(5), async {
        while watcher.snapshot().applied_seq().await != Some(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("snapshot should apply the refresh");

    assert!(!watcher.is_loading().await);
    let names: Vec<String> = watcher
        .clusters()
        .await
        .into_iter()
        .map(|c| c.cluster_name)
        .collect();
    assert_eq!(names, vec!["mysql-a", "mysql-b", "mysql-c", "mongo-a"]);

    watcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_watcher_records_kubernetes_listing_failure() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(KUBERNETES_LIST))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let source = DbClusterSource::new(
        client_for(&mock_server),
        KubernetesSource::Server,
        FailurePolicy::Drop,
    );
    let watcher = DbClusterWatcher::spawn_with(
        source,
        Duration::from_secs(3600),
        TickPolicy::Serialize,
        ResultOrdering::LastSettled,
    )
    .unwrap();

    assert!(watcher.refresh().await.is_err());

    tokio::time::timeout(Duration::from_secs(5), async {
        while watcher.snapshot().last_error().await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("snapshot should record the failure");

    let error = watcher.snapshot().last_error().await.unwrap();
    assert!(error.contains("failed to list kubernetes clusters"));
    assert!(watcher.clusters().await.is_empty());

    watcher.shutdown().await.unwrap();
}
