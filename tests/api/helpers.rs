use std::path::PathBuf;

use once_cell::sync::Lazy;
use secrecy::Secret;
use uuid::Uuid;
use waitlist_intake::{
    configuration::{get_configuration, RetrySettings, Settings},
    startup::Application,
    telemetry::{get_subscriber, init_subscriber},
};
use wiremock::MockServer;

pub const ADMIN_SECRET: &str = "test-admin-secret";
pub const STORE_PATH: &str = "/rest/v1/subscribers";

static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
    pub store_server: MockServer,
    pub email_server: MockServer,
    pub fallback_path: Option<PathBuf>,
    pub api_client: reqwest::Client,
}

impl TestApp {
    pub async fn post_subscription(&self, body: String) -> reqwest::Response {
        self.api_client
            .post(&format!("{}/subscribe", &self.address))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn preflight_subscription(&self) -> reqwest::Response {
        self.api_client
            .request(reqwest::Method::OPTIONS, &format!("{}/subscribe", &self.address))
            .header("Origin", "https://example.com")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request")
    }

    pub async fn post_sync(
        &self,
        body: &serde_json::Value,
        authorization: Option<&str>,
    ) -> reqwest::Response {
        let mut request = self
            .api_client
            .post(&format!("{}/admin/sync-subscriptions", &self.address))
            .json(body);
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }
        request.send().await.expect("Failed to send request")
    }

    /// JSON bodies the fake store has received, in order.
    pub async fn stored_records(&self) -> Vec<serde_json::Value> {
        self.store_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Spawns the application against fresh mock servers. `customise` runs
/// after the test defaults have been applied.
pub async fn spawn_app_with(customise: impl FnOnce(&mut Settings)) -> TestApp {
    // The first time `initalize` is invoked the code in TRACING is executed
    // All other invocations will instead skip execution
    Lazy::force(&TRACING);

    let store_server = MockServer::start().await;
    let email_server = MockServer::start().await;

    let configuration = {
        let mut c = get_configuration().expect("Failed to read configuration");
        // use a random OS port
        c.application.port = 0;
        c.application.host = "127.0.0.1".into();
        c.store.base_url = Some(store_server.uri());
        c.store.api_key = Some(Secret::new("test-store-key".into()));
        c.store.timeout_milliseconds = 500;
        c.store.fallback_path = None;
        c.store.retry = RetrySettings {
            max_attempts: 1,
            base_delay_milliseconds: 1,
            max_delay_milliseconds: 1,
        };
        c.email_client.base_url = email_server.uri();
        c.email_client.authorization_token = Some(Secret::new("test-email-token".into()));
        c.email_client.timeout_milliseconds = 500;
        c.admin.secret = Some(Secret::new(ADMIN_SECRET.into()));
        customise(&mut c);
        c
    };
    let fallback_path = configuration.store.fallback_path.clone();

    // Launch the app
    let application = Application::build(configuration)
        .await
        .expect("Failed to create app");
    let address = format!("http://127.0.0.1:{}", application.port());
    let _ = tokio::spawn(application.run_until_stopped());

    TestApp {
        address,
        store_server,
        email_server,
        fallback_path,
        api_client: reqwest::Client::new(),
    }
}

pub fn temporary_fallback_path() -> PathBuf {
    std::env::temp_dir().join(format!("waitlist-{}.jsonl", Uuid::new_v4()))
}
