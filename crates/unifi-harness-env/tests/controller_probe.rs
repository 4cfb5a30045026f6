//! Controller probe tests against a mock controller.

use std::time::Duration;

use serde_json::json;
use unifi_harness_core::VersionGate;
use unifi_harness_env::{
    ControllerProbe, HarnessConfig, Probe, ProbeResult, ReadinessConfig, ReadinessPoller,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> HarnessConfig {
    HarnessConfig {
        username: "admin".to_string(),
        password: "hunter2".to_string(),
        request_timeout: Duration::from_secs(2),
        ..HarnessConfig::with_api_url(server.uri())
    }
}

async fn mount_login(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .and(body_json(json!({"username": "admin", "password": "hunter2"})))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("set-cookie", "unifises=abc123; Path=/")
                .set_body_json(json!({"meta": {"rc": "ok"}, "data": []})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn reports_server_version() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"rc": "ok", "up": true, "server_version": "7.3.83"},
            "data": []
        })))
        .mount(&server)
        .await;

    let probe = ControllerProbe::new(&config_for(&server)).unwrap();
    assert_eq!(
        probe.probe().await,
        ProbeResult::ReachableWithVersion("7.3.83".to_string())
    );
}

#[tokio::test]
async fn falls_back_to_site_list_without_version() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"meta": {"rc": "ok", "up": true}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/self/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"rc": "ok"},
            "data": [{"name": "default", "desc": "Default"}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let probe = ControllerProbe::new(&config_for(&server)).unwrap();
    assert_eq!(probe.probe().await, ProbeResult::ReachableNoVersion);

    let sites = probe.list_sites().await.unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].name, "default");
}

#[tokio::test]
async fn site_list_error_is_unreachable() {
    let server = MockServer::start().await;
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/self/sites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"rc": "error", "msg": "api.err.LoginRequired"},
            "data": []
        })))
        .mount(&server)
        .await;

    let probe = ControllerProbe::new(&config_for(&server)).unwrap();
    match probe.probe().await {
        ProbeResult::Unreachable(reason) => {
            assert!(reason.contains("api.err.LoginRequired"), "{reason}");
        }
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_login_is_unreachable() {
    let server = MockServer::start().await;
    mount_login(&server, 400).await;

    let probe = ControllerProbe::new(&config_for(&server)).unwrap();
    match probe.probe().await {
        ProbeResult::Unreachable(reason) => assert!(reason.contains("/api/login"), "{reason}"),
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let config = HarnessConfig {
        request_timeout: Duration::from_secs(2),
        ..HarnessConfig::with_api_url("http://127.0.0.1:1")
    };

    let probe = ControllerProbe::new(&config).unwrap();
    assert!(matches!(probe.probe().await, ProbeResult::Unreachable(_)));
}

#[tokio::test]
async fn poller_waits_for_controller_then_gates_version() {
    let server = MockServer::start().await;
    // The first two logins fail while the controller is still starting.
    Mock::given(method("POST"))
        .and(path("/api/login"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_login(&server, 200).await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "meta": {"rc": "ok", "server_version": "6.5.55"}
        })))
        .mount(&server)
        .await;

    let probe = ControllerProbe::new(&config_for(&server)).unwrap();
    let poller = ReadinessPoller::new(ReadinessConfig::new(
        Duration::from_secs(10),
        Duration::from_millis(50),
    ))
    .unwrap();

    let report = poller.poll_until_ready(&probe).await.unwrap();
    assert_eq!(report.ticks, 3);
    assert_eq!(report.version.as_deref(), Some("6.5.55"));

    let gate = VersionGate::compiled();
    gate.check_minimum(report.version.as_deref().unwrap_or_default())
        .unwrap();
}
