// MIT License - Copyright (c) 2026 Peter Wright
// Integration tests for `CloudSession` against a mock API

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sector_alarm_bridge::{ArmMode, CloudSession, LoginOutcome};

// ── Helpers ─────────────────────────────────────────────────────────

fn session(server: &MockServer, token: Option<&str>) -> CloudSession {
    CloudSession::new(
        server.uri(),
        "me@example.com",
        "pw",
        "12345",
        token.map(str::to_string),
    )
}

async fn mount_login(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/Login/Login"))
        .and(body_json(json!({"userId": "me@example.com", "password": "pw"})))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_panel_status(server: &MockServer, token: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/api/panel/GetPanelStatus"))
        .and(query_param("panelId", "12345"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"IsOnline": true})))
        .mount(server)
        .await;
}

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let server = MockServer::start().await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"AuthorizationToken": "tok-1"})),
    )
    .await;

    let mut session = session(&server, None);
    assert_eq!(session.login(false).await, LoginOutcome::Success("tok-1".into()));
    assert_eq!(session.token(), Some("tok-1"));
}

#[tokio::test]
async fn test_login_requires_two_factor() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(204)).await;

    let mut session = session(&server, None);
    assert_eq!(session.login(true).await, LoginOutcome::TwoFactorRequired);
    assert!(!session.has_token());
}

#[tokio::test]
async fn test_login_rejected() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(401)).await;

    let mut session = session(&server, None);
    assert_eq!(session.login(true).await, LoginOutcome::Failed);
}

#[tokio::test]
async fn test_login_server_error() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(500).set_body_string("boom")).await;

    let mut session = session(&server, None);
    assert_eq!(session.login(true).await, LoginOutcome::Failed);
}

#[tokio::test]
async fn test_login_ok_without_token_fails() {
    let server = MockServer::start().await;
    mount_login(&server, ResponseTemplate::new(200).set_body_json(json!({}))).await;

    let mut session = session(&server, None);
    assert_eq!(session.login(true).await, LoginOutcome::Failed);
}

#[tokio::test]
async fn test_login_transport_failure() {
    // Nothing listens on port 1.
    let mut session = CloudSession::new("http://127.0.0.1:1", "me@example.com", "pw", "12345", None);
    assert_eq!(session.login(true).await, LoginOutcome::Failed);
}

#[tokio::test]
async fn test_login_reuses_valid_token() {
    let server = MockServer::start().await;
    mount_panel_status(&server, "tok-old", 200).await;
    Mock::given(method("POST"))
        .and(path("/api/Login/Login"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = session(&server, Some("tok-old"));
    assert_eq!(session.login(false).await, LoginOutcome::Success("tok-old".into()));
}

#[tokio::test]
async fn test_forced_login_skips_token_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/panel/GetPanelStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;
    mount_login(&server, ResponseTemplate::new(204)).await;

    let mut session = session(&server, Some("tok-old"));
    assert_eq!(session.login(true).await, LoginOutcome::TwoFactorRequired);
}

#[tokio::test]
async fn test_login_after_rejected_token() {
    let server = MockServer::start().await;
    mount_panel_status(&server, "tok-old", 401).await;
    mount_login(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"AuthorizationToken": "tok-new"})),
    )
    .await;

    let mut session = session(&server, Some("tok-old"));
    assert_eq!(session.login(false).await, LoginOutcome::Success("tok-new".into()));
    assert_eq!(session.token(), Some("tok-new"));
}

// ── Two-factor ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_two_factor_code_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Login/ValidateTwoWayVerificationCode"))
        .and(body_json(json!({
            "UserId": "me@example.com",
            "Password": "pw",
            "Code": "123456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"AuthorizationToken": "tok-2fa"})))
        .mount(&server)
        .await;

    let mut session = session(&server, None);
    assert!(session.validate_two_factor_code(" 123456 ").await);
    assert_eq!(session.token(), Some("tok-2fa"));
}

#[tokio::test]
async fn test_two_factor_code_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/Login/ValidateTwoWayVerificationCode"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad code"))
        .mount(&server)
        .await;

    let mut session = session(&server, None);
    assert!(!session.validate_two_factor_code("000000").await);
    assert!(!session.has_token());
}

// ── Token validation ────────────────────────────────────────────────

#[tokio::test]
async fn test_validate_token_without_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = session(&server, None);
    assert!(!session.validate_token().await);
}

#[tokio::test]
async fn test_validate_token_is_repeatable() {
    let server = MockServer::start().await;
    mount_panel_status(&server, "tok", 200).await;

    let mut session = session(&server, Some("tok"));
    assert!(session.validate_token().await);
    assert!(session.validate_token().await);
    assert_eq!(session.token(), Some("tok"));
}

#[tokio::test]
async fn test_validate_token_rejected() {
    let server = MockServer::start().await;
    mount_panel_status(&server, "tok", 401).await;

    let mut session = session(&server, Some("tok"));
    assert!(!session.validate_token().await);
}

// ── Data and commands ───────────────────────────────────────────────

#[tokio::test]
async fn test_fetches_use_panel_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/panel/GetLogs"))
        .and(query_param("panelId", "12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"EventType": "armed"}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v2/housecheck/temperatures"))
        .and(body_json(json!({"PanelId": "12345"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Sections": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/housecheck/panels/12345/humidity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Sections": []})))
        .mount(&server)
        .await;

    let mut session = session(&server, Some("tok"));
    assert_eq!(session.get_event_log().await, Some(json!([{"EventType": "armed"}])));
    assert_eq!(session.get_temperatures().await, Some(json!({"Sections": []})));
    assert_eq!(session.get_humidity().await, Some(json!({"Sections": []})));
}

#[tokio::test]
async fn test_fetch_failure_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/panel/GetLogs"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut session = session(&server, Some("tok"));
    assert_eq!(session.get_event_log().await, None);
}

#[tokio::test]
async fn test_fetch_without_token_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = session(&server, None);
    assert_eq!(session.get_event_log().await, None);
}

#[tokio::test]
async fn test_arm_modes_map_to_endpoints() {
    let server = MockServer::start().await;
    for endpoint in ["Arm", "PartialArm", "Disarm"] {
        Mock::given(method("POST"))
            .and(path(format!("/api/panel/{endpoint}")))
            .and(body_json(json!({"PanelCode": "1234", "PanelId": "12345"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut session = session(&server, Some("tok"));
    assert!(session.arm_system("1234", ArmMode::Total).await);
    assert!(session.arm_system("1234", ArmMode::Partial).await);
    assert!(session.arm_system("1234", ArmMode::Disarm).await);
}

#[tokio::test]
async fn test_arm_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/panel/Arm"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let mut session = session(&server, Some("tok"));
    assert!(!session.arm_system("0000", ArmMode::Total).await);
}
