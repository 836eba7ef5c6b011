use serde_json::json;

use crate::helpers::spawn_app;

#[tokio::test]
async fn delivery_events_are_acknowledged() {
    let app = spawn_app().await;

    for event in [
        json!({ "type": "email.sent", "data": { "to": ["ursula@example.com"] } }),
        json!({ "type": "email.delivered", "data": { "email": "ursula@example.com" } }),
        json!({ "type": "email.bounced" }),
        json!({ "type": "email.sent", "data": null }),
    ] {
        let res = app
            .api_client
            .post(&format!("{}/webhooks/resend", &app.address))
            .header("svix-signature", "v1,signature")
            .json(&event)
            .send()
            .await
            .expect("Failed to execute request");

        assert_eq!(res.status().as_u16(), 200);
        let payload: serde_json::Value = res.json().await.unwrap();
        assert_eq!(payload, json!({ "success": true }));
    }
}

#[tokio::test]
async fn unsigned_events_are_still_acknowledged() {
    let app = spawn_app().await;

    let res = app
        .api_client
        .post(&format!("{}/webhooks/resend", &app.address))
        .json(&json!({ "type": "email.sent", "data": {} }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(res.status().as_u16(), 200);
}

#[tokio::test]
async fn events_without_a_type_are_rejected() {
    let app = spawn_app().await;

    let res = app
        .api_client
        .post(&format!("{}/webhooks/resend", &app.address))
        .json(&json!({ "data": {} }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(res.status().as_u16(), 400);
}

#[tokio::test]
async fn webhook_preflight_returns_200() {
    let app = spawn_app().await;

    let res = app
        .api_client
        .request(
            reqwest::Method::OPTIONS,
            &format!("{}/webhooks/resend", &app.address),
        )
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(res.status().as_u16(), 200);
}
