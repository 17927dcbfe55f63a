//! User-facing actions
//!
//! Wraps the API services with the orchestration a management UI performs
//! around them and produces the [`Notice`] that should be shown to the user
//! once an action succeeded. Failures are returned untouched; callers log
//! them and keep going.

use std::fmt;

use tracing::{info, instrument};

use crate::api::ApiClient;
use crate::api::alert_rules::{
    AlertRule, AlertRulesService, CreateAlertRule, ToggleState, UpdateAlertRule,
};
use crate::api::channels::{ChannelDraft, NotificationChannel, NotificationChannelService};
use crate::api::kubernetes::{Kubernetes, list_kubernetes};
use crate::api::templates::{Template, TemplateService};
use crate::error::ClientResult;

pub const COPY_OF: &str = "Copy of";

/// Success message for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice(pub String);

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn rule_notice(summary: &str, action: &str) -> Notice {
    Notice(format!("Alert rule \"{summary}\" successfully {action}"))
}

#[derive(Debug, Clone)]
pub struct Console {
    client: ApiClient,
    rules: AlertRulesService,
    channels: NotificationChannelService,
    templates: TemplateService,
}

impl Console {
    pub fn new(client: ApiClient) -> Self {
        Self {
            rules: AlertRulesService::new(client.clone()),
            channels: NotificationChannelService::new(client.clone()),
            templates: TemplateService::new(client.clone()),
            client,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub async fn alert_rules(&self) -> ClientResult<Vec<AlertRule>> {
        self.rules.list().await
    }

    pub async fn find_alert_rule(&self, rule_id: &str) -> ClientResult<Option<AlertRule>> {
        Ok(self
            .rules
            .list()
            .await?
            .into_iter()
            .find(|rule| rule.rule_id == rule_id))
    }

    pub async fn create_alert_rule(&self, rule: &CreateAlertRule) -> ClientResult<Notice> {
        self.rules.create(rule).await?;
        Ok(rule_notice(&rule.summary, "created"))
    }

    pub async fn update_alert_rule(&self, rule: &UpdateAlertRule) -> ClientResult<Notice> {
        self.rules.update(rule).await?;
        Ok(rule_notice(&rule.rule.summary, "updated"))
    }

    /// Flip a rule between enabled and disabled
    #[instrument(skip_all, fields(rule = %rule.rule_id))]
    pub async fn toggle_alert_rule(&self, rule: &AlertRule) -> ClientResult<Notice> {
        let disabled = if rule.disabled {
            ToggleState::False
        } else {
            ToggleState::True
        };
        self.rules.toggle(&rule.rule_id, disabled).await?;

        info!("toggled alert rule");
        let action = if rule.disabled { "enabled" } else { "disabled" };
        Ok(rule_notice(&rule.summary, action))
    }

    #[instrument(skip_all, fields(rule = %rule.rule_id))]
    pub async fn delete_alert_rule(&self, rule: &AlertRule) -> ClientResult<Notice> {
        self.rules.delete(&rule.rule_id).await?;
        info!("deleted alert rule");
        Ok(rule_notice(&rule.summary, "deleted"))
    }

    /// Create a disabled duplicate named "Copy of <summary>"
    #[instrument(skip_all, fields(rule = %rule.rule_id))]
    pub async fn copy_alert_rule(&self, rule: &AlertRule) -> ClientResult<Notice> {
        let summary = format!("{COPY_OF} {}", rule.summary);
        let payload = CreateAlertRule::copy_of(&rule.raw, summary);
        self.create_alert_rule(&payload).await
    }

    pub async fn channels(&self) -> ClientResult<Vec<NotificationChannel>> {
        self.channels.list().await
    }

    pub async fn add_channel(&self, draft: &ChannelDraft) -> ClientResult<Notice> {
        self.channels.add(draft).await?;
        Ok(Notice("Notification channel successfully added".to_string()))
    }

    pub async fn change_channel(
        &self,
        channel_id: &str,
        draft: &ChannelDraft,
    ) -> ClientResult<Notice> {
        self.channels.change(channel_id, draft).await?;
        Ok(Notice("Notification channel successfully edited".to_string()))
    }

    pub async fn remove_channel(&self, channel: &NotificationChannel) -> ClientResult<Notice> {
        self.channels.remove(&channel.channel_id).await?;
        Ok(Notice(format!(
            "Notification channel \"{}\" successfully deleted",
            channel.summary
        )))
    }

    pub async fn templates(&self) -> ClientResult<Vec<Template>> {
        self.templates.list().await
    }

    pub async fn create_template(&self, yaml: &str) -> ClientResult<Notice> {
        self.templates.create(yaml).await?;
        Ok(Notice("Alert rule template successfully added".to_string()))
    }

    pub async fn update_template(&self, yaml: &str) -> ClientResult<Notice> {
        self.templates.update(yaml).await?;
        Ok(Notice("Alert rule template successfully edited".to_string()))
    }

    pub async fn delete_template(&self, name: &str) -> ClientResult<Notice> {
        self.templates.delete(name).await?;
        Ok(Notice(format!("Alert rule template \"{name}\" successfully deleted")))
    }

    pub async fn kubernetes(&self) -> ClientResult<Vec<Kubernetes>> {
        list_kubernetes(&self.client).await
    }
}
