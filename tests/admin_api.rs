// tests/admin_api.rs

//! Black-box coverage of the admin HTTP surface: project CRUD, entry CRUD,
//! client listing, and the Prometheus scrape endpoint.

mod common;

use common::fixtures::build_config;
use common::test_helpers::{admin_url, spawn_server};
use serde_json::{Value, json};

#[tokio::test]
async fn project_and_entry_lifecycle_round_trips() {
    let fixture = build_config(10, false);
    let http_port = fixture.config.http.port;
    spawn_server(fixture.config).await;
    let client = reqwest::Client::new();

    let create = client
        .post(admin_url(http_port, "/rtc/api/config?config_name=App"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert!(create.status().is_success());
    let body: Value = create.json().await.unwrap();
    assert_eq!(body["code"], 0);

    let list = client
        .get(admin_url(http_port, "/rtc/api/config/list"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert!(
        list["data"]["list"]
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "App")
    );

    let add_item = client
        .post(admin_url(
            http_port,
            "/rtc/api/config/item?config_name=App&env=default",
        ))
        .json(&json!({ "key": "greeting", "desc": "", "value": "hello" }))
        .send()
        .await
        .unwrap();
    assert!(add_item.status().is_success());

    let duplicate = client
        .post(admin_url(
            http_port,
            "/rtc/api/config/item?config_name=App&env=default",
        ))
        .json(&json!({ "key": "greeting", "desc": "", "value": "again" }))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(duplicate["code"], 1);

    let items = client
        .get(admin_url(
            http_port,
            "/rtc/api/config/item?config_name=App&env=default",
        ))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    let entries = items["data"].as_array().unwrap();
    assert!(entries.iter().any(|e| e["key"] == "greeting"));

    let delete_item = client
        .delete(admin_url(
            http_port,
            "/rtc/api/config/item?config_name=App&env=default",
        ))
        .json(&json!({ "key": "greeting" }))
        .send()
        .await
        .unwrap();
    assert!(delete_item.status().is_success());

    let delete_project = client
        .delete(admin_url(http_port, "/rtc/api/config?config_name=App"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(delete_project["code"], 0);
}

#[tokio::test]
async fn client_list_reflects_active_subscribers() {
    let fixture = build_config(10, false);
    let port = fixture.config.port;
    let http_port = fixture.config.http.port;
    spawn_server(fixture.config).await;
    let client = reqwest::Client::new();

    client
        .post(admin_url(http_port, "/rtc/api/config?config_name=App"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    let empty = client
        .get(admin_url(http_port, "/rtc/api/client?config_name=App"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert!(empty["data"].as_array().unwrap().is_empty());

    let mut subscriber = common::test_helpers::SubscribeClient::connect(port).await;
    subscriber.pull("App", "default", "", json!({})).await;

    let populated = client
        .get(admin_url(http_port, "/rtc/api/client?config_name=App"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(populated["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let fixture = build_config(10, false);
    let http_port = fixture.config.http.port;
    spawn_server(fixture.config).await;

    let body = reqwest::get(admin_url(http_port, "/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("livecfg_pulls_total"));
}
