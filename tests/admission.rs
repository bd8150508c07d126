//! Per-client admission over real connections.

use std::sync::Arc;

use greenlight::config::{AdmissionConfig, ApiConfig};
use greenlight::mailer::LogMailer;
use reqwest::StatusCode;

mod common;

fn config(admission: AdmissionConfig) -> ApiConfig {
    ApiConfig {
        admission,
        ..ApiConfig::default()
    }
}

#[tokio::test]
async fn burst_is_admitted_then_client_is_limited() {
    let server = common::spawn_server(
        config(AdmissionConfig {
            burst: 2,
            requests_per_second: 0.01,
            ..AdmissionConfig::default()
        }),
        Arc::new(LogMailer),
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("{}/v1/healthcheck", server.url());

    for _ in 0..2 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "rate limit exceeded");

    assert_eq!(server.limiter.len(), 1);
    assert!(server.limiter.bucket("127.0.0.1").is_some());

    let report = server.shutdown().await;
    assert!(!report.drain_timed_out());
}

#[tokio::test]
async fn disabled_limiter_admits_everything() {
    let server = common::spawn_server(
        config(AdmissionConfig {
            enabled: false,
            burst: 1,
            ..AdmissionConfig::default()
        }),
        Arc::new(LogMailer),
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("{}/v1/healthcheck", server.url());

    for _ in 0..10 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    assert!(server.limiter.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn settings_update_takes_effect_without_restart() {
    let server = common::spawn_server(
        config(AdmissionConfig {
            burst: 1,
            requests_per_second: 0.01,
            ..AdmissionConfig::default()
        }),
        Arc::new(LogMailer),
    )
    .await;
    let client = reqwest::Client::new();
    let url = format!("{}/v1/healthcheck", server.url());

    assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);
    assert_eq!(
        client.get(&url).send().await.unwrap().status(),
        StatusCode::TOO_MANY_REQUESTS
    );

    server.limiter.update_settings(AdmissionConfig {
        enabled: false,
        ..AdmissionConfig::default()
    });
    assert_eq!(client.get(&url).send().await.unwrap().status(), StatusCode::OK);

    server.shutdown().await;
}
