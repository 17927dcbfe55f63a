//! Kubernetes clusters registered for DBaaS

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiClient;
use crate::error::ClientResult;

const LIST_PATH: &str = "/v1/management/DBaaS/Kubernetes/List";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorStatus {
    #[default]
    #[serde(rename = "OPERATORS_STATUS_INVALID")]
    Invalid,
    #[serde(rename = "OPERATORS_STATUS_OK")]
    Ok,
    #[serde(rename = "OPERATORS_STATUS_UNSUPPORTED")]
    Unsupported,
    #[serde(rename = "OPERATORS_STATUS_NOT_INSTALLED")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    #[serde(default)]
    pub status: OperatorStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operators {
    #[serde(default)]
    pub xtradb: Operator,
    #[serde(default)]
    pub psmdb: Operator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KubernetesClusterStatus {
    #[default]
    #[serde(rename = "KUBERNETES_CLUSTER_STATUS_INVALID")]
    Invalid,
    #[serde(rename = "KUBERNETES_CLUSTER_STATUS_OK")]
    Ok,
    #[serde(rename = "KUBERNETES_CLUSTER_STATUS_UNAVAILABLE")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kubernetes {
    pub kubernetes_cluster_name: String,
    #[serde(default)]
    pub operators: Operators,
    #[serde(default)]
    pub status: KubernetesClusterStatus,
}

impl Kubernetes {
    /// Cluster with both operators reported healthy
    pub fn healthy(name: impl ToString) -> Self {
        let ok = Operator {
            status: OperatorStatus::Ok,
        };
        Self {
            kubernetes_cluster_name: name.to_string(),
            operators: Operators { xtradb: ok, psmdb: ok },
            status: KubernetesClusterStatus::Ok,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct KubernetesListResponse {
    #[serde(default)]
    kubernetes_clusters: Vec<Kubernetes>,
}

pub async fn list_kubernetes(client: &ApiClient) -> ClientResult<Vec<Kubernetes>> {
    let response: KubernetesListResponse = client.list(LIST_PATH).await?;
    debug!(
        "listed {} kubernetes clusters",
        response.kubernetes_clusters.len()
    );
    Ok(response.kubernetes_clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_kubernetes() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(LIST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "kubernetes_clusters": [
                    {
                        "kubernetes_cluster_name": "Cluster 1",
                        "operators": {
                            "xtradb": { "status": "OPERATORS_STATUS_OK" },
                            "psmdb": { "status": "OPERATORS_STATUS_NOT_INSTALLED" }
                        },
                        "status": "KUBERNETES_CLUSTER_STATUS_OK"
                    },
                    { "kubernetes_cluster_name": "Cluster 2" }
                ]
            })))
            .mount(&mock_server)
            .await;

        let client = ApiClient::with_base_url(&mock_server.uri()).unwrap();
        let clusters = list_kubernetes(&client).await.unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].operators.xtradb.status, OperatorStatus::Ok);
        assert_eq!(clusters[0].operators.psmdb.status, OperatorStatus::Unavailable);
        assert_eq!(clusters[1].status, KubernetesClusterStatus::Invalid);
        assert_eq!(clusters[1].operators.xtradb.status, OperatorStatus::Invalid);
    }
}
