//! End-to-end tests of the web surface over a real listener.

use std::net::SocketAddr;

use axum::http::StatusCode;
use ddns::app::{register_subsystems, WEB_ADDR};
use ddns::config::DdnsConfig;
use ddns::lifecycle::Lifecycle;
use serde_json::{json, Value};

async fn start() -> (Lifecycle, SocketAddr) {
    let mut config = DdnsConfig::default();
    config.web.bind_address = "127.0.0.1:0".into();
    config.web.admin = "admin".into();
    config.web.passwd = "secret".into();

    let lifecycle = Lifecycle::new();
    register_subsystems(&lifecycle, config).unwrap();
    let report = lifecycle.run().await.unwrap();
    assert!(report.is_complete(), "{:?}", report.failed);

    let addr = *lifecycle.registry().get(&WEB_ADDR).unwrap();
    (lifecycle, addr)
}

fn session_cookie(response: &reqwest::Response) -> String {
    let set_cookie = response.headers()["set-cookie"].to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn test_login_session_logout_flow() {
    let (lifecycle, addr) = start().await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let resp = client
        .get(format!("{}/api/session", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(format!("{}/api/login", base))
        .json(&json!({ "name": "admin", "passwd": "secret" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    assert!(cookie.starts_with("ddns_sid="));

    let resp = client
        .get(format!("{}/api/session", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["user_id"], 1);

    let resp = client
        .post(format!("{}/api/logout", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["set-cookie"].to_str().unwrap().contains("Max-Age=0"));

    let resp = client
        .get(format!("{}/api/session", base))
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let report = lifecycle.stop().await.unwrap();
    assert!(report.failed.is_empty(), "{:?}", report.failed);
    assert_eq!(report.completed, vec!["web", "session-sweeper"]);
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let (lifecycle, addr) = start().await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/login", addr))
        .json(&json!({ "name": "admin", "passwd": "guess" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get("set-cookie").is_none());

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_reports_backend() {
    let (lifecycle, addr) = start().await;

    let body: Value = reqwest::get(format!("http://{}/status", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "operational");
    assert_eq!(body["session_backend"], "memory");

    lifecycle.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_stops_accepting_after_stop() {
    let (lifecycle, addr) = start().await;
    lifecycle.stop().await.unwrap();

    let result = reqwest::get(format!("http://{}/status", addr)).await;
    assert!(result.is_err());
}
