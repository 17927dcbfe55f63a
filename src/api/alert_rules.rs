//! Integrated alerting rules
//!
//! Rules are listed in their wire shape and then formatted into [`AlertRule`],
//! the flattened view shown in tables: severity labels, human readable
//! durations and thresholds, `key=value` filters and local timestamps.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiClient;
use super::templates::Template;
use crate::error::ClientResult;

const BASE_PATH: &str = "/v1/management/ia/Rules";

/// Display format for rule timestamps
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

static SECONDS_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(?:\.\d+)?s$").expect("duration pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "SEVERITY_CRITICAL")]
    Critical,
    #[serde(rename = "SEVERITY_ERROR")]
    Error,
    #[serde(rename = "SEVERITY_WARNING")]
    Warning,
    #[serde(rename = "SEVERITY_NOTICE")]
    Notice,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Error => "High",
            Severity::Warning => "Warning",
            Severity::Notice => "Notice",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    #[serde(rename = "PARAM_TYPE_INVALID")]
    Invalid,
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "FLOAT")]
    Float,
    #[serde(rename = "STRING")]
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    #[serde(rename = "EQUAL")]
    Equal,
}

impl FilterType {
    pub fn operator(&self) -> &'static str {
        match self {
            FilterType::Equal => "=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: FilterType,
    pub value: String,
}

impl Filter {
    pub fn equal(key: impl ToString, value: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            kind: FilterType::Equal,
            value: value.to_string(),
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.key, self.kind.operator(), self.value)
    }
}

/// Concrete parameter value set on a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bool: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub float: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
}

impl RuleParam {
    pub fn float(name: impl ToString, value: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamType::Float,
            bool: None,
            float: Some(value),
            string: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleChannel {
    pub channel_id: String,
    #[serde(default)]
    pub summary: String,
}

/// A rule as returned by `Rules/List`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRulePayload {
    pub rule_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub disabled: bool,
    pub severity: Severity,
    #[serde(rename = "for")]
    pub duration: Option<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub params: Vec<RuleParam>,
    #[serde(default)]
    pub channels: Vec<RuleChannel>,
    pub template: Template,
    #[serde(default)]
    pub expr: String,
    pub created_at: Option<DateTime<Utc>>,
    pub last_notified: Option<DateTime<Utc>>,
    pub custom_labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct AlertRuleListResponse {
    #[serde(default)]
    rules: Vec<AlertRulePayload>,
}

/// Body of `Rules/Create`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateAlertRule {
    pub template_name: String,
    pub summary: String,
    pub disabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<RuleParam>,
    #[serde(rename = "for", skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_labels: Option<BTreeMap<String, String>>,
    pub filters: Vec<Filter>,
    pub channel_ids: Vec<String>,
}

/// Body of `Rules/Update`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateAlertRule {
    pub rule_id: String,
    #[serde(flatten)]
    pub rule: CreateAlertRule,
}

/// Tri-state flag accepted by `Rules/Toggle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToggleState {
    DoNotChange,
    True,
    False,
}

#[derive(Debug, Clone, Serialize)]
struct ToggleAlertRule<'a> {
    rule_id: &'a str,
    disabled: ToggleState,
}

#[derive(Debug, Clone, Serialize)]
struct DeleteAlertRule<'a> {
    rule_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateAlertRuleResponse {
    #[serde(default)]
    rule_id: String,
}

/// Rule formatted for display
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub rule_id: String,
    pub summary: String,
    pub disabled: bool,
    pub severity: &'static str,
    pub duration: String,
    pub threshold: String,
    pub filters: Vec<String>,
    pub created_at: String,
    pub last_notified: String,
    pub expr: String,
    pub raw: AlertRulePayload,
}

impl From<AlertRulePayload> for AlertRule {
    fn from(raw: AlertRulePayload) -> Self {
        Self {
            rule_id: raw.rule_id.clone(),
            summary: raw.summary.clone(),
            disabled: raw.disabled,
            severity: raw.severity.label(),
            duration: raw.duration.as_deref().map(format_duration).unwrap_or_default(),
            threshold: format_threshold(&raw),
            filters: raw.filters.iter().map(Filter::to_string).collect(),
            created_at: raw.created_at.map(format_date).unwrap_or_default(),
            last_notified: raw.last_notified.map(format_date).unwrap_or_default(),
            expr: raw.expr.clone(),
            raw,
        }
    }
}

pub fn format_rules(rules: Vec<AlertRulePayload>) -> Vec<AlertRule> {
    rules.into_iter().map(AlertRule::from).collect()
}

/// `"600s"` becomes `"600 seconds"`; anything else is shown as is
pub fn format_duration(duration: &str) -> String {
    match SECONDS_DURATION.captures(duration) {
        Some(caps) if &caps[1] == "1" => "1 second".to_string(),
        Some(caps) => format!("{} seconds", &caps[1]),
        None => duration.to_string(),
    }
}

/// First float parameter with the unit its template declares for it
pub fn format_threshold(rule: &AlertRulePayload) -> String {
    let Some((param, value)) = rule
        .params
        .iter()
        .find_map(|p| (p.kind == ParamType::Float).then_some(p).zip(p.float))
    else {
        return String::new();
    };

    match rule.template.unit_of(&param.name).map(|u| u.symbol()) {
        Some(unit) if !unit.is_empty() => format!("{value} {unit}"),
        _ => value.to_string(),
    }
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.format(DATE_FORMAT).to_string()
}

impl CreateAlertRule {
    /// Payload for a disabled duplicate of `rule`, named `summary`
    pub fn copy_of(rule: &AlertRulePayload, summary: String) -> Self {
        Self {
            template_name: rule.template.name.clone(),
            summary,
            disabled: true,
            params: rule.params.clone(),
            duration: rule.duration.clone(),
            severity: Some(rule.severity),
            custom_labels: rule.custom_labels.clone(),
            filters: rule.filters.clone(),
            channel_ids: rule.channels.iter().map(|c| c.channel_id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertRulesService {
    client: ApiClient,
}

impl AlertRulesService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn list_raw(&self) -> ClientResult<Vec<AlertRulePayload>> {
        let response: AlertRuleListResponse =
            self.client.list(&format!("{BASE_PATH}/List")).await?;
        debug!("listed {} alert rules", response.rules.len());
        Ok(response.rules)
    }

    pub async fn list(&self) -> ClientResult<Vec<AlertRule>> {
        self.list_raw().await.map(format_rules)
    }

    /// Create a rule and return its new id
    pub async fn create(&self, rule: &CreateAlertRule) -> ClientResult<String> {
        let response: CreateAlertRuleResponse = self
            .client
            .post(&format!("{BASE_PATH}/Create"), rule)
            .await?;
        Ok(response.rule_id)
    }

    pub async fn update(&self, rule: &UpdateAlertRule) -> ClientResult<()> {
        self.client
            .post_unit(&format!("{BASE_PATH}/Update"), rule)
            .await
    }

    pub async fn toggle(&self, rule_id: &str, disabled: ToggleState) -> ClientResult<()> {
        self.client
            .post_unit(
                &format!("{BASE_PATH}/Toggle"),
                &ToggleAlertRule { rule_id, disabled },
            )
            .await
    }

    pub async fn delete(&self, rule_id: &str) -> ClientResult<()> {
        self.client
            .post_unit(&format!("{BASE_PATH}/Delete"), &DeleteAlertRule { rule_id })
            .await
    }
}
