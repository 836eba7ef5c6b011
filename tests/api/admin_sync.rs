use serde_json::json;
use wiremock::{
    matchers::{any, body_string_contains, path},
    Mock, ResponseTemplate,
};

use crate::helpers::{spawn_app, spawn_app_with, ADMIN_SECRET, STORE_PATH};

fn bearer() -> String {
    format!("Bearer {}", ADMIN_SECRET)
}

fn batch() -> serde_json::Value {
    json!({
        "subscriptions": [
            { "email": "New@Example.com", "name": "New" },
            { "email": "dup@example.com" },
            { "email": "not-an-email" },
            { "name": "No email" }
        ]
    })
}

#[tokio::test]
async fn requests_without_credentials_are_rejected_with_401() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.store_server)
        .await;

    let test_cases = vec![
        (None, "no header"),
        (Some("Basic dXNlcjpwYXNz".to_string()), "basic scheme"),
        (Some(ADMIN_SECRET.to_string()), "missing scheme"),
    ];
    for (authorization, description) in test_cases {
        let res = app.post_sync(&batch(), authorization.as_deref()).await;
        assert_eq!(
            res.status().as_u16(),
            401,
            "Test Failed for: {}",
            description
        );
        assert!(res.headers().contains_key("www-authenticate"));
        let payload: serde_json::Value = res.json().await.unwrap();
        assert_eq!(payload["error"], "Unauthorized");
    }
}

#[tokio::test]
async fn a_wrong_token_is_rejected_with_403() {
    let app = spawn_app().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&app.store_server)
        .await;

    let res = app.post_sync(&batch(), Some("Bearer guess")).await;

    assert_eq!(res.status().as_u16(), 403);
    let payload: serde_json::Value = res.json().await.unwrap();
    assert_eq!(payload["error"], "Invalid token");
}

#[tokio::test]
async fn every_token_is_rejected_when_no_admin_secret_is_configured() {
    let app = spawn_app_with(|c| c.admin.secret = None).await;

    let res = app.post_sync(&batch(), Some("Bearer anything")).await;

    assert_eq!(res.status().as_u16(), 403);
}

#[tokio::test]
async fn an_empty_batch_is_a_400() {
    let app = spawn_app().await;

    for body in [json!({ "subscriptions": [] }), json!({})] {
        let res = app.post_sync(&body, Some(bearer().as_str())).await;

        assert_eq!(res.status().as_u16(), 400);
        let payload: serde_json::Value = res.json().await.unwrap();
        assert_eq!(
            payload["error"],
            "subscriptions array is required and must not be empty"
        );
    }
}

#[tokio::test]
async fn a_batch_that_is_not_an_array_is_a_400() {
    let app = spawn_app().await;

    let res = app
        .post_sync(&json!({ "subscriptions": "a@b.com" }), Some(bearer().as_str()))
        .await;

    assert_eq!(res.status().as_u16(), 400);
}

#[tokio::test]
async fn an_unconfigured_store_is_a_503() {
    let app = spawn_app_with(|c| c.store.base_url = None).await;

    let res = app.post_sync(&batch(), Some(bearer().as_str())).await;

    assert_eq!(res.status().as_u16(), 503);
}

#[tokio::test]
async fn a_batch_is_tallied_per_record() {
    let app = spawn_app().await;
    Mock::given(path(STORE_PATH))
        .and(body_string_contains("dup@example.com"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&app.store_server)
        .await;
    Mock::given(path(STORE_PATH))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&app.store_server)
        .await;

    let res = app.post_sync(&batch(), Some(bearer().as_str())).await;

    assert_eq!(res.status().as_u16(), 200);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["message"], "Sync completed");
    assert_eq!(report["success"], 1);
    assert_eq!(report["duplicates"], 1);
    assert_eq!(report["failed"], 2);
    assert_eq!(
        report["errors"],
        json!([
            { "email": "not-an-email", "error": "Invalid email format" },
            { "email": null, "error": "Invalid email format" }
        ])
    );

    let stored: Vec<serde_json::Value> = app
        .stored_records()
        .await
        .into_iter()
        .filter(|r| r["email"] == "new@example.com")
        .collect();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["source"], "admin-sync");
    assert_eq!(stored[0]["name"], "New");
}

#[tokio::test]
async fn store_failures_are_counted_and_never_queued() {
    let fallback_path = crate::helpers::temporary_fallback_path();
    let app = spawn_app_with(|c| c.store.fallback_path = Some(fallback_path.clone())).await;
    Mock::given(path(STORE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.store_server)
        .await;

    let body = json!({ "subscriptions": [{ "email": "ursula@example.com" }] });
    let res = app.post_sync(&body, Some(bearer().as_str())).await;

    assert_eq!(res.status().as_u16(), 200);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["success"], 0);
    assert_eq!(report["failed"], 1);
    assert_eq!(report["errors"][0]["email"], "ursula@example.com");
    assert!(!fallback_path.exists());
}
