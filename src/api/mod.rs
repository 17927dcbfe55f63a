//! HTTP client for the management API
//!
//! Every endpoint of the management API is a `POST` with a JSON body, even the
//! listing ones. Wire payloads use snake_case field names; the per-resource
//! modules translate them into the models the rest of the crate works with.
//!
//! ## Resources
//!
//! - [`alert_rules`]: integrated alerting rules (`/v1/management/ia/Rules`)
//! - [`templates`]: alert rule templates (`/v1/management/ia/Templates`)
//! - [`channels`]: notification channels (`/v1/management/ia/Channels`)
//! - [`kubernetes`]: registered Kubernetes clusters (`/v1/management/DBaaS/Kubernetes`)
//! - [`dbcluster`]: database clusters per database type

pub mod alert_rules;
pub mod channels;
pub mod dbcluster;
pub mod kubernetes;
pub mod templates;

use reqwest::Url;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::{instrument, trace};

use crate::config::Config;
use crate::error::{ClientError, ClientResult};

/// Credentials attached to every request
#[derive(Debug, Clone)]
enum Auth {
    None,
    Bearer(String),
    Basic { username: String, password: String },
}

/// Thin wrapper around a reused `reqwest::Client` bound to one server
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    auth: Auth,
}

impl ApiClient {
    /// Build a client from the loaded configuration
    pub fn new(config: &Config) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(ClientError::Build)?;

        let auth = match (&config.api_key, &config.username, &config.password) {
            (Some(key), _, _) => Auth::Bearer(key.clone()),
            (None, Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => Auth::None,
        };

        Ok(Self {
            client,
            base_url: normalize_base_url(&config.server_url)?,
            auth,
        })
    }

    /// Client without credentials and default timeouts, mostly for tests
    pub fn with_base_url(base_url: &str) -> ClientResult<Self> {
        Self::new(&Config {
            server_url: base_url.to_string(),
            ..Config::default()
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path` and decode the JSON answer
    #[instrument(skip(self, body))]
    pub async fn post<B, R>(&self, path: &str, body: &B) -> ClientResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let text = self.send(path, body).await?;

        // empty answers decode like an empty object
        let text = if text.trim().is_empty() {
            "{}"
        } else {
            text.as_str()
        };

        serde_json::from_str(text).map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// POST `body` to `path`, ignoring whatever the server answers with
    #[instrument(skip(self, body))]
    pub async fn post_unit<B>(&self, path: &str, body: &B) -> ClientResult<()>
    where
        B: Serialize + ?Sized,
    {
        self.send(path, body).await.map(|_| ())
    }

    /// POST an empty JSON object, as the listing endpoints expect
    pub async fn list<R: DeserializeOwned>(&self, path: &str) -> ClientResult<R> {
        self.post(path, &json!({})).await
    }

    async fn send<B>(&self, path: &str, body: &B) -> ClientResult<String>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{path}", self.base_url);
        trace!("POST {url}");

        let mut request = self.client.post(&url).json(body);
        request = match &self.auth {
            Auth::None => request,
            Auth::Bearer(key) => request.bearer_auth(key),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        };

        let response = request.send().await.map_err(|source| ClientError::Transport {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| ClientError::Transport {
                path: path.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(ClientError::Status {
                path: path.to_string(),
                status,
                body: text,
            });
        }

        Ok(text)
    }
}

fn normalize_base_url(raw: &str) -> ClientResult<String> {
    let url = Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl(format!(
            "{raw}: unsupported scheme {}",
            url.scheme()
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
