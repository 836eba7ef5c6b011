use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use anyhow::Context;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

use crate::domain::{InvalidSubscriber, NewSubscriber, ADMIN_SYNC_SOURCE};
use crate::routes::{error_chain_fmt, ErrorBody};
use crate::startup::AdminSecret;
use crate::store::InsertOutcome;
use crate::waitlist::Waitlist;

#[derive(serde::Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    subscriptions: Vec<SyncRecord>,
}

#[derive(serde::Deserialize)]
pub struct SyncRecord {
    email: Option<String>,
    name: Option<String>,
    source: Option<String>,
}

#[derive(serde::Serialize)]
struct SyncReport {
    message: &'static str,
    success: u32,
    duplicates: u32,
    failed: u32,
    errors: Vec<SyncFailure>,
}

#[derive(serde::Serialize)]
struct SyncFailure {
    email: Option<String>,
    error: String,
}

impl SyncReport {
    fn new() -> Self {
        Self {
            message: "Sync completed",
            success: 0,
            duplicates: 0,
            failed: 0,
            errors: Vec::new(),
        }
    }

    fn record_failure(&mut self, email: Option<String>, error: String) {
        self.failed += 1;
        self.errors.push(SyncFailure { email, error });
    }
}

#[derive(thiserror::Error)]
pub enum SyncError {
    #[error("Unauthorized")]
    MissingCredentials(#[source] anyhow::Error),
    #[error("Invalid token")]
    InvalidToken(#[source] anyhow::Error),
    #[error("{0}")]
    ValidationError(String),
    #[error("Server configuration error")]
    ConfigurationError(#[source] anyhow::Error),
}

impl std::fmt::Debug for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SyncError {
    fn status_code(&self) -> StatusCode {
        match self {
            SyncError::MissingCredentials(_) => StatusCode::UNAUTHORIZED,
            SyncError::InvalidToken(_) => StatusCode::FORBIDDEN,
            SyncError::ValidationError(_) => StatusCode::BAD_REQUEST,
            SyncError::ConfigurationError(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        if let SyncError::MissingCredentials(_) = self {
            response.insert_header((header::WWW_AUTHENTICATE, r#"Bearer realm="admin""#));
        }
        response.json(ErrorBody::new(self.to_string()))
    }
}

/// Replays signups that never reached the store.
///
/// The body is parsed only after the bearer token checks out.
#[tracing::instrument(
    name = "Syncing pending subscriptions",
    skip(body, waitlist, admin_secret, request),
    fields(batch_size = tracing::field::Empty)
)]
pub async fn sync_subscriptions(
    body: web::Bytes,
    waitlist: web::Data<Waitlist>,
    admin_secret: web::Data<AdminSecret>,
    request: HttpRequest,
) -> Result<HttpResponse, SyncError> {
    let token = bearer_token(request.headers()).map_err(SyncError::MissingCredentials)?;
    verify_token(token, &admin_secret)?;

    let SyncRequest { subscriptions } = serde_json::from_slice(&body)
        .map_err(|_| SyncError::ValidationError("Invalid request format".into()))?;
    if subscriptions.is_empty() {
        return Err(SyncError::ValidationError(
            "subscriptions array is required and must not be empty".into(),
        ));
    }
    if !waitlist.is_configured() {
        return Err(SyncError::ConfigurationError(anyhow::anyhow!(
            "The store URL or API key is missing"
        )));
    }
    tracing::Span::current().record("batch_size", &subscriptions.len());

    let mut report = SyncReport::new();
    for SyncRecord {
        email,
        name,
        source,
    } in subscriptions
    {
        let submitted_email = email.clone();
        let subscriber = match NewSubscriber::parse(email, name, source, ADMIN_SYNC_SOURCE) {
            Ok(subscriber) => subscriber,
            Err(InvalidSubscriber::Email(_)) => {
                report.record_failure(submitted_email, "Invalid email format".into());
                continue;
            }
            Err(e) => {
                report.record_failure(submitted_email, e.to_string());
                continue;
            }
        };
        match waitlist.sync(&subscriber).await {
            Ok(InsertOutcome::Duplicate) => report.duplicates += 1,
            Ok(_) => report.success += 1,
            Err(e) => {
                tracing::error!(
                    subscriber_email = %subscriber.email,
                    error.cause_chain = ?e,
                    "Failed to sync subscriber"
                );
                report.record_failure(submitted_email, e.to_string());
            }
        }
    }

    tracing::info!(
        success = report.success,
        duplicates = report.duplicates,
        failed = report.failed,
        "Sync completed"
    );
    Ok(HttpResponse::Ok().json(report))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, anyhow::Error> {
    let header_value = headers
        .get(header::AUTHORIZATION)
        .context("The 'Authorization' header was missing")?
        .to_str()
        .context("The 'Authorization' header was not a valid UTF8 string")?;
    header_value
        .strip_prefix("Bearer ")
        .context("The authorization scheme was not 'Bearer'")
}

fn verify_token(token: &str, admin_secret: &AdminSecret) -> Result<(), SyncError> {
    let expected = admin_secret
        .0
        .as_ref()
        .filter(|secret| !secret.expose_secret().is_empty())
        .ok_or_else(|| SyncError::InvalidToken(anyhow::anyhow!("No admin secret is configured")))?;
    let key = expected.expose_secret().as_bytes();
    let keyed_mac = || {
        Hmac::<Sha256>::new_from_slice(key).map_err(|e| {
            SyncError::InvalidToken(anyhow::anyhow!("Failed to key the token comparison: {}", e))
        })
    };
    let mut mac = keyed_mac()?;
    mac.update(key);
    let expected_tag = mac.finalize().into_bytes();

    // Constant-time comparison.
    let mut mac = keyed_mac()?;
    mac.update(token.as_bytes());
    mac.verify_slice(&expected_tag).map_err(|_| {
        SyncError::InvalidToken(anyhow::anyhow!(
            "The bearer token does not match the admin secret"
        ))
    })
}
