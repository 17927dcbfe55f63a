//! Notices produced by user actions

use pmm_console::Console;
use pmm_console::api::channels::{ChannelDraft, ChannelKind, PagerDutyKey};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::client_for;

async fn ok_on(mock_server: &MockServer, endpoint: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_channel_lifecycle_notices() {
    let mock_server = MockServer::start().await;
    ok_on(&mock_server, "/v1/management/ia/Channels/Add").await;
    ok_on(&mock_server, "/v1/management/ia/Channels/Change").await;
    ok_on(&mock_server, "/v1/management/ia/Channels/Remove").await;

    Mock::given(method("POST"))
        .and(path("/v1/management/ia/Channels/List"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "channels": [{ "channel_id": "pd-1", "summary": "on call", "pagerduty_config": { "routing_key": "rk" } }]
        })))
        .mount(&mock_server)
        .await;

    let console = Console::new(client_for(&mock_server));
    let draft = ChannelDraft {
        summary: "on call".to_string(),
        send_resolved: false,
        kind: ChannelKind::pager_duty(PagerDutyKey::Routing, "rk"),
    };

    let added = console.add_channel(&draft).await.unwrap();
    assert_eq!(added.to_string(), "Notification channel successfully added");

    let edited = console.change_channel("pd-1", &draft).await.unwrap();
    assert_eq!(edited.to_string(), "Notification channel successfully edited");

    let channel = console.channels().await.unwrap().remove(0);
    let removed = console.remove_channel(&channel).await.unwrap();
    assert_eq!(
        removed.to_string(),
        "Notification channel \"on call\" successfully deleted"
    );
}

#[tokio::test]
async fn test_template_notices() {
    let mock_server = MockServer::start().await;
    let yaml = "templates:\n  - name: custom_rule\n";

    Mock::given(method("POST"))
        .and(path("/v1/management/ia/Templates/Create"))
        .and(body_json(json!({ "yaml": yaml })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    ok_on(&mock_server, "/v1/management/ia/Templates/Delete").await;

    let console = Console::new(client_for(&mock_server));

    let created = console.create_template(yaml).await.unwrap();
    assert_eq!(created.to_string(), "Alert rule template successfully added");

    let deleted = console.delete_template("custom_rule").await.unwrap();
    assert_eq!(
        deleted.to_string(),
        "Alert rule template \"custom_rule\" successfully deleted"
    );
}

#[tokio::test]
async fn test_failed_action_returns_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/management/ia/Templates/Update"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "message": "bad yaml" })))
        .mount(&mock_server)
        .await;

    let console = Console::new(client_for(&mock_server));
    let err = console.update_template("nope").await.unwrap_err();

    assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
    assert!(err.to_string().contains("bad yaml"));
}
