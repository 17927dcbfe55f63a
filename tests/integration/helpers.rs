//! Helper functions for integration tests

use pmm_console::ApiClient;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const XTRADB_LIST: &str = "/v1/management/DBaaS/XtraDBClusters/List";
pub const PSMDB_LIST: &str = "/v1/management/DBaaS/PSMDBClusters/List";
pub const KUBERNETES_LIST: &str = "/v1/management/DBaaS/Kubernetes/List";

pub fn client_for(mock_server: &MockServer) -> ApiClient {
    ApiClient::with_base_url(&mock_server.uri()).unwrap()
}

pub fn kubernetes_json(name: &str, xtradb: &str, psmdb: &str) -> Value {
    json!({
        "kubernetes_cluster_name": name,
        "operators": {
            "xtradb": { "status": xtradb },
            "psmdb": { "status": psmdb }
        },
        "status": "KUBERNETES_CLUSTER_STATUS_OK"
    })
}

pub fn healthy_kubernetes_json(name: &str) -> Value {
    kubernetes_json(name, "OPERATORS_STATUS_OK", "OPERATORS_STATUS_OK")
}

pub fn xtradb_cluster_json(name: &str) -> Value {
    json!({
        "name": name,
        "state": "XTRA_DB_CLUSTER_STATE_READY",
        "params": {
            "cluster_size": 3,
            "pxc": {
                "compute_resources": { "cpu_m": 1000, "memory_bytes": "2000000000" },
                "disk_size": "25000000000"
            },
            "proxysql": {
                "compute_resources": { "cpu_m": 500, "memory_bytes": "1000000000" },
                "disk_size": "1000000000"
            }
        }
    })
}

pub fn psmdb_cluster_json(name: &str) -> Value {
    json!({
        "name": name,
        "state": "PSMDB_CLUSTER_STATE_CHANGING",
        "operation": { "message": "creating", "finished_steps": 2, "total_steps": 5 },
        "params": {
            "cluster_size": 3,
            "replicaset": {
                "compute_resources": { "cpu_m": 2000, "memory_bytes": 4000000000u64 },
                "disk_size": 10000000000u64
            }
        }
    })
}

/// Serve `clusters` for list requests on `list_path` naming `kubernetes`
pub async fn mount_clusters(
    mock_server: &MockServer,
    list_path: &str,
    kubernetes: &str,
    clusters: Vec<Value>,
) {
    Mock::given(method("POST"))
        .and(path(list_path))
        .and(body_partial_json(json!({ "kubernetes_cluster_name": kubernetes })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "clusters": clusters })))
        .mount(mock_server)
        .await;
}

pub async fn mount_cluster_error(
    mock_server: &MockServer,
    list_path: &str,
    kubernetes: &str,
    status: u16,
) {
    Mock::given(method("POST"))
        .and(path(list_path))
        .and(body_partial_json(json!({ "kubernetes_cluster_name": kubernetes })))
        .respond_with(ResponseTemplate::new(status).set_body_string("operator unreachable"))
        .mount(mock_server)
        .await;
}

pub async fn mount_kubernetes(mock_server: &MockServer, kubernetes: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path(KUBERNETES_LIST))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "kubernetes_clusters": kubernetes })),
        )
        .mount(mock_server)
        .await;
}
