//! Alert rule templates
//!
//! Templates are authored as YAML and uploaded verbatim; the server parses
//! them and hands back structured definitions when listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::ApiClient;
use super::alert_rules::{ParamType, Severity};
use crate::error::ClientResult;

const BASE_PATH: &str = "/v1/management/ia/Templates";

/// Unit attached to a template parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamUnit {
    #[serde(rename = "PARAM_UNIT_INVALID")]
    Invalid,
    #[serde(rename = "PERCENTAGE")]
    Percentage,
}

impl ParamUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            ParamUnit::Invalid => "",
            ParamUnit::Percentage => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultValue<T> {
    pub default: Option<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloatDefinition {
    pub default: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Parameter declared by a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParam {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    pub unit: Option<ParamUnit>,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bool: Option<DefaultValue<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float: Option<FloatDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<DefaultValue<String>>,
}

/// Where a template came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateSource {
    TemplateSourceInvalid,
    BuiltIn,
    Saas,
    UserFile,
    UserApi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub expr: String,
    #[serde(default)]
    pub params: Vec<TemplateParam>,
    #[serde(rename = "for")]
    pub duration: Option<String>,
    pub severity: Option<Severity>,
    pub source: Option<TemplateSource>,
    pub yaml: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Template {
    /// Look up the unit of a declared parameter by name
    pub fn unit_of(&self, param: &str) -> Option<ParamUnit> {
        self.params
            .iter()
            .find(|p| p.name == param)
            .and_then(|p| p.unit)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TemplateListResponse {
    #[serde(default)]
    templates: Vec<Template>,
}

#[derive(Debug, Clone)]
pub struct TemplateService {
    client: ApiClient,
}

impl TemplateService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ClientResult<Vec<Template>> {
        let response: TemplateListResponse =
            self.client.list(&format!("{BASE_PATH}/List")).await?;
        debug!("listed {} templates", response.templates.len());
        Ok(response.templates)
    }

    /// Upload a new template from its YAML source
    pub async fn create(&self, yaml: &str) -> ClientResult<()> {
        self.client
            .post_unit(&format!("{BASE_PATH}/Create"), &json!({ "yaml": yaml }))
            .await
    }

    /// Replace an existing template; the name is taken from the YAML
    pub async fn update(&self, yaml: &str) -> ClientResult<()> {
        self.client
            .post_unit(&format!("{BASE_PATH}/Update"), &json!({ "yaml": yaml }))
            .await
    }

    pub async fn delete(&self, name: &str) -> ClientResult<()> {
        self.client
            .post_unit(&format!("{BASE_PATH}/Delete"), &json!({ "name": name }))
            .await
    }
}
