//! Notification channels
//!
//! The wire format carries the type-specific settings in one of three
//! optional config blocks; which one is present decides the channel type.
//! [`ChannelKind`] is the tagged model side of that mapping.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiClient;
use crate::error::{ClientError, ClientResult};

const BASE_PATH: &str = "/v1/management/ia/Channels";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub send_resolved: bool,
    #[serde(default)]
    pub to: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub send_resolved: bool,
    pub channel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerDutyConfig {
    #[serde(default)]
    pub send_resolved: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub routing_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_key: String,
}

/// A channel in its wire shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPayload {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_config: Option<EmailConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slack_config: Option<SlackConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagerduty_config: Option<PagerDutyConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChannelListResponse {
    #[serde(default)]
    channels: Vec<ChannelPayload>,
}

/// Which PagerDuty key the user chose to fill in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagerDutyKey {
    Routing,
    Service,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Email {
        emails: Vec<String>,
    },
    Slack {
        channel: String,
    },
    PagerDuty {
        routing_key: String,
        service_key: String,
    },
}

impl ChannelKind {
    /// PagerDuty settings with only the chosen key kept
    pub fn pager_duty(key_type: PagerDutyKey, key: impl ToString) -> Self {
        let key = key.to_string();
        match key_type {
            PagerDutyKey::Routing => ChannelKind::PagerDuty {
                routing_key: key,
                service_key: String::new(),
            },
            PagerDutyKey::Service => ChannelKind::PagerDuty {
                routing_key: String::new(),
                service_key: key,
            },
        }
    }

    pub fn type_label(&self) -> &'static str {
        match self {
            ChannelKind::Email { .. } => "Email",
            ChannelKind::Slack { .. } => "Slack",
            ChannelKind::PagerDuty { .. } => "PagerDuty",
        }
    }

    /// Short description of where notifications go
    pub fn target(&self) -> String {
        match self {
            ChannelKind::Email { emails } => emails.join(", "),
            ChannelKind::Slack { channel } => channel.clone(),
            ChannelKind::PagerDuty {
                routing_key,
                service_key,
            } => {
                if routing_key.is_empty() {
                    service_key.clone()
                } else {
                    routing_key.clone()
                }
            }
        }
    }

    /// Kind and `send_resolved` flag of the config block that is present
    fn from_payload(payload: &ChannelPayload) -> Option<(Self, bool)> {
        if let Some(email) = &payload.email_config {
            let kind = ChannelKind::Email {
                emails: email.to.clone(),
            };
            return Some((kind, email.send_resolved));
        }
        if let Some(slack) = &payload.slack_config {
            let kind = ChannelKind::Slack {
                channel: slack.channel.clone(),
            };
            return Some((kind, slack.send_resolved));
        }
        payload.pagerduty_config.as_ref().map(|pd| {
            let kind = ChannelKind::PagerDuty {
                routing_key: pd.routing_key.clone(),
                service_key: pd.service_key.clone(),
            };
            (kind, pd.send_resolved)
        })
    }

    fn apply_to(&self, payload: &mut ChannelPayload, send_resolved: bool) {
        match self {
            ChannelKind::Email { emails } => {
                payload.email_config = Some(EmailConfig {
                    send_resolved,
                    to: emails.clone(),
                });
            }
            ChannelKind::Slack { channel } => {
                payload.slack_config = Some(SlackConfig {
                    send_resolved,
                    channel: channel.clone(),
                });
            }
            ChannelKind::PagerDuty {
                routing_key,
                service_key,
            } => {
                payload.pagerduty_config = Some(PagerDutyConfig {
                    send_resolved,
                    routing_key: routing_key.clone(),
                    service_key: service_key.clone(),
                });
            }
        }
    }
}

/// Channel model used outside the wire layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub channel_id: String,
    pub summary: String,
    pub disabled: bool,
    /// Also notify when the alert resolves
    pub send_resolved: bool,
    pub kind: ChannelKind,
}

impl NotificationChannel {
    /// Draft carrying the current settings, to be edited and sent back
    pub fn to_draft(&self) -> ChannelDraft {
        ChannelDraft {
            summary: self.summary.clone(),
            send_resolved: self.send_resolved,
            kind: self.kind.clone(),
        }
    }
}

impl TryFrom<ChannelPayload> for NotificationChannel {
    type Error = ClientError;

    fn try_from(payload: ChannelPayload) -> Result<Self, Self::Error> {
        let (kind, send_resolved) =
            ChannelKind::from_payload(&payload).ok_or_else(|| ClientError::UnknownChannelType {
                channel_id: payload.channel_id.clone(),
            })?;

        Ok(Self {
            channel_id: payload.channel_id,
            summary: payload.summary,
            disabled: payload.disabled,
            send_resolved,
            kind,
        })
    }
}

/// Values submitted when adding or changing a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDraft {
    pub summary: String,
    pub send_resolved: bool,
    pub kind: ChannelKind,
}

impl ChannelDraft {
    pub fn to_payload(&self) -> ChannelPayload {
        let mut payload = ChannelPayload {
            summary: self.summary.clone(),
            ..ChannelPayload::default()
        };
        self.kind.apply_to(&mut payload, self.send_resolved);
        payload
    }
}

#[derive(Debug, Clone)]
pub struct NotificationChannelService {
    client: ApiClient,
}

impl NotificationChannelService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// List channels, skipping any whose type this client does not know
    pub async fn list(&self) -> ClientResult<Vec<NotificationChannel>> {
        let response: ChannelListResponse =
            self.client.list(&format!("{BASE_PATH}/List")).await?;
        debug!("listed {} notification channels", response.channels.len());

        Ok(response
            .channels
            .into_iter()
            .filter_map(|payload| match NotificationChannel::try_from(payload) {
                Ok(channel) => Some(channel),
                Err(e) => {
                    warn!("skipping channel: {e}");
                    None
                }
            })
            .collect())
    }

    pub async fn add(&self, draft: &ChannelDraft) -> ClientResult<()> {
        self.client
            .post_unit(&format!("{BASE_PATH}/Add"), &draft.to_payload())
            .await
    }

    pub async fn change(&self, channel_id: &str, draft: &ChannelDraft) -> ClientResult<()> {
        let payload = ChannelPayload {
            channel_id: channel_id.to_string(),
            ..draft.to_payload()
        };
        self.client
            .post_unit(&format!("{BASE_PATH}/Change"), &payload)
            .await
    }

    pub async fn remove(&self, channel_id: &str) -> ClientResult<()> {
        self.client
            .post_unit(
                &format!("{BASE_PATH}/Remove"),
                &serde_json::json!({ "channel_id": channel_id }),
            )
            .await
    }
}
