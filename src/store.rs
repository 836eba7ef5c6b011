use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use uuid::Uuid;

use crate::domain::NewSubscriber;
use crate::routes::error_chain_fmt;

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The email was already present. Not a failure.
    Duplicate,
    /// The store was unreachable and the record went to the local queue.
    Queued,
}

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("The subscriber store is not configured")]
    NotConfigured,
    #[error("The subscriber store could not be reached")]
    Unavailable(#[source] anyhow::Error),
    #[error("The subscriber store rejected our credentials")]
    Unauthorized(#[source] anyhow::Error),
    #[error("The subscriber store rejected the record")]
    Rejected(#[source] anyhow::Error),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

#[derive(serde::Serialize)]
struct InsertSubscriberRequest<'a> {
    id: Uuid,
    email: &'a str,
    name: Option<&'a str>,
    source: &'a str,
    subscribed_at: DateTime<Utc>,
}

/// REST client for the hosted `subscribers` table.
#[derive(Clone)]
pub struct SubscriberStore {
    http_client: Client,
    base_url: String,
    api_key: Secret<String>,
    table: String,
}

impl SubscriberStore {
    pub fn new(base_url: String, api_key: Secret<String>, table: String, timeout: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build the store HTTP client");
        Self {
            http_client,
            base_url,
            api_key,
            table,
        }
    }

    fn table_url(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.base_url.trim_end_matches('/'),
            self.table
        )
    }

    #[tracing::instrument(
        name = "Saving new subscriber details in the store",
        skip(self, subscriber),
        fields(subscriber_email = %subscriber.email)
    )]
    pub async fn insert(&self, subscriber: &NewSubscriber) -> Result<InsertOutcome, StoreError> {
        let request_body = InsertSubscriberRequest {
            id: Uuid::new_v4(),
            email: subscriber.email.as_ref(),
            name: subscriber.name.as_ref().map(|n| n.as_ref()),
            source: subscriber.source.as_ref(),
            subscribed_at: Utc::now(),
        };
        let response = self
            .http_client
            .post(self.table_url())
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(self.api_key.expose_secret())
            .header("Prefer", "return=minimal")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to reach the subscriber store: {:?}", e);
                if e.is_builder() {
                    StoreError::Unexpected(e.into())
                } else {
                    StoreError::Unavailable(e.into())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(InsertOutcome::Inserted);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(
            status = status.as_u16(),
            body = %body.chars().take(300).collect::<String>(),
            "The subscriber store refused the insert"
        );
        classify_failure(status, &body)
    }
}

/// Maps a non-2xx store response onto an outcome or an error.
pub fn classify_failure(status: StatusCode, body: &str) -> Result<InsertOutcome, StoreError> {
    if status == StatusCode::CONFLICT
        || (status == StatusCode::BAD_REQUEST
            && (body.contains(UNIQUE_VIOLATION) || body.contains("duplicate key")))
    {
        return Ok(InsertOutcome::Duplicate);
    }
    let cause = anyhow!("The store responded with {}", status);
    match status {
        StatusCode::BAD_REQUEST => Err(StoreError::Rejected(cause)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(StoreError::Unauthorized(cause)),
        StatusCode::REQUEST_TIMEOUT
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => Err(StoreError::Unavailable(cause)),
        _ => Err(StoreError::Unexpected(cause)),
    }
}
