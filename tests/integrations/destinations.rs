//! Real destination clients against mock HTTP servers.

use runwatch::app::App;
use runwatch::config::{Config, DeliveryConfig, DestinationKind, NotifyMode};
use runwatch::core::Attachment;
use runwatch::notification::{build_destinations, http::build_client, Dispatcher};
use runwatch::runner::CommandPlan;
use serde_json::json;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::test_utils::test_config;

fn fast_delivery() -> DeliveryConfig {
    DeliveryConfig {
        max_attempts: 3,
        backoff_ms: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_app_delivers_to_webhook_and_telegram() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("x-team", "infra"))
        .and(body_json(json!({ "text": "Final output\n```\nbuild ok\n```" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_string_contains("build ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.notify.callbacks = vec![DestinationKind::Webhook, DestinationKind::Telegram];
    config.webhook.url = Some(format!("{}/hook", server.uri()));
    config
        .webhook
        .headers
        .insert("X-Team".to_string(), "infra".to_string());
    config.telegram.bot_token = Some("123:abc".to_string());
    config.telegram.chat_id = Some("42".to_string());
    config.telegram.api_base = server.uri();

    let code = App::builder(config)
        .build()
        .run(&CommandPlan::shell("echo 'build ok'"))
        .await
        .unwrap();

    assert_eq!(code, 0);
    // Expectations are verified when the server is dropped.
}

#[tokio::test]
async fn test_server_errors_are_retried_then_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.webhook.url = Some(format!("{}/hook", server.uri()));

    let http = build_client(&config.transport).unwrap();
    let dispatcher = Dispatcher::new(build_destinations(&config, &http).unwrap(), &fast_delivery());
    dispatcher.broadcast_text("will fail").await.unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn test_slack_file_without_token_degrades_to_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .and(body_json(json!({
            "text": "Final output (part 1/1)\n```\nlog line\n\n```",
            "mrkdwn": true
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.notify.callbacks = vec![DestinationKind::Slack];
    config.slack.webhook_url = Some(format!("{}/slack", server.uri()));

    let http = build_client(&config.transport).unwrap();
    let dispatcher = Dispatcher::new(build_destinations(&config, &http).unwrap(), &fast_delivery());
    dispatcher
        .broadcast_file(Attachment::text_file(
            "output.part.001.log",
            b"log line\n".to_vec(),
            "Final output (part 1/1)",
        ))
        .await
        .unwrap();
    dispatcher.close().await;
}

#[tokio::test]
async fn test_attach_only_uploads_to_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("output.part.001.log"))
        .and(body_string_contains("first\nsecond\n"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = test_config();
    config.notify.mode = NotifyMode::AttachOnly;
    config.webhook.url = Some(format!("{}/hook", server.uri()));

    App::builder(config)
        .build()
        .run(&CommandPlan::shell("echo first; echo second"))
        .await
        .unwrap();
}
