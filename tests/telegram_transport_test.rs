//! Telegram transport tests against a mocked Bot API server

use serde_json::json;
use tannoy::bot::{MenuButton, TelegramTransport, Transport};
use tannoy::errors::TannoyError;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "12345:TESTTOKEN";

fn transport_for(server: &MockServer) -> TelegramTransport {
    TelegramTransport::new(TOKEN.to_string(), vec![], 1).with_api_base(server.uri())
}

#[tokio::test]
async fn test_send_addresses_the_topic_thread() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .and(body_partial_json(json!({
            "chat_id": -100123,
            "message_thread_id": 9,
            "text": "hello topic"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 42 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    transport
        .send(-100123, Some(9), "hello topic")
        .await
        .expect("send should succeed");
}

#[tokio::test]
async fn test_send_without_topic_omits_thread_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    transport.send(55, None, "plain").await.expect("send ok");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("message_thread_id").is_none());
}

#[tokio::test]
async fn test_api_rejection_is_a_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let err = transport
        .send(1, None, "hi")
        .await
        .expect_err("expected rejection");
    assert!(matches!(err, TannoyError::Transport(_)));
    assert!(err.to_string().contains("chat not found"));
}

#[tokio::test]
async fn test_render_menu_edits_existing_surface() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/editMessageText", TOKEN)))
        .and(body_partial_json(json!({ "chat_id": 7, "message_id": 33 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let buttons = [MenuButton::new("Start", "start")];
    let surface = transport
        .render_menu(7, Some(33), "menu", &buttons)
        .await
        .expect("edit ok");
    assert_eq!(surface, 33);
}

#[tokio::test]
async fn test_render_menu_falls_back_to_fresh_send_when_edit_fails() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/editMessageText", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "description": "Bad Request: message to edit not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 77 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let buttons = [MenuButton::new("Start", "start")];
    let surface = transport
        .render_menu(7, Some(33), "menu", &buttons)
        .await
        .expect("fallback send ok");
    assert_eq!(surface, 77);
}

#[tokio::test]
async fn test_render_menu_without_surface_sends_fresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/bot{}/sendMessage", TOKEN)))
        .and(body_partial_json(json!({ "chat_id": 7 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 5 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server);
    let buttons = [
        MenuButton::new("Set message", "set_message"),
        MenuButton::new("Quit", "quit"),
    ];
    let surface = transport
        .render_menu(7, None, "menu", &buttons)
        .await
        .expect("send ok");
    assert_eq!(surface, 5);

    // The inline keyboard carries the choice tokens.
    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let rows = body["reply_markup"]["inline_keyboard"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1][0]["callback_data"], "quit");
}
