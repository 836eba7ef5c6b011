use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::domain::{InvalidSubscriber, NewSubscriber, DEFAULT_SOURCE};
use crate::email_client::EmailClient;
use crate::routes::{error_chain_fmt, ErrorBody};
use crate::store::{InsertOutcome, StoreError};
use crate::waitlist::Waitlist;

#[derive(serde::Deserialize)]
pub struct FormData {
    #[serde(default)]
    email: serde_json::Value,
    name: Option<String>,
    source: Option<String>,
}

#[derive(serde::Serialize)]
struct SubscribeResponse<'a> {
    success: bool,
    message: &'static str,
    data: SubscribedData<'a>,
}

#[derive(serde::Serialize)]
struct SubscribedData<'a> {
    email: &'a str,
    queued: bool,
    confirmation_email_sent: bool,
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("Invalid request format")]
    MalformedRequest(#[source] serde_json::Error),
    #[error("{0}")]
    ValidationError(String),
    #[error("You are already on our waitlist!")]
    AlreadySubscribed,
    #[error("Server configuration error")]
    ConfigurationError(#[source] anyhow::Error),
    #[error("Unable to connect to the subscription service. Please try again in a moment.")]
    UpstreamUnavailable(#[source] anyhow::Error),
    #[error("An unexpected error occurred. Please try again later.")]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<StoreError> for SubscribeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotConfigured | StoreError::Unauthorized(_) => {
                Self::ConfigurationError(e.into())
            }
            StoreError::Rejected(_) => Self::ValidationError("Invalid data provided".into()),
            StoreError::Unavailable(_) => Self::UpstreamUnavailable(e.into()),
            StoreError::Unexpected(_) => Self::UnexpectedError(e.into()),
        }
    }
}

impl std::fmt::Debug for SubscribeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl ResponseError for SubscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SubscribeError::MalformedRequest(_) | SubscribeError::ValidationError(_) => {
                StatusCode::BAD_REQUEST
            }
            SubscribeError::AlreadySubscribed => StatusCode::CONFLICT,
            SubscribeError::ConfigurationError(_) | SubscribeError::UpstreamUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            SubscribeError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody::new(self.to_string()))
    }
}

#[tracing::instrument(
    name = "Adding a new subscriber",
    skip(body, waitlist, email_client, request),
    fields(
        subscriber_email = tracing::field::Empty,
        client_ip = %client_ip(request.headers()),
        user_agent = %user_agent(request.headers()),
    )
)]
pub async fn subscribe(
    body: web::Bytes,
    waitlist: web::Data<Waitlist>,
    email_client: web::Data<Option<EmailClient>>,
    request: HttpRequest,
) -> Result<HttpResponse, SubscribeError> {
    if !waitlist.is_configured() {
        return Err(SubscribeError::ConfigurationError(anyhow::anyhow!(
            "The store URL or API key is missing"
        )));
    }

    let FormData {
        email,
        name,
        source,
    } = serde_json::from_slice(&body).map_err(SubscribeError::MalformedRequest)?;
    let email = email.as_str().map(String::from);
    let new_subscriber =
        NewSubscriber::parse(email, name, source, DEFAULT_SOURCE).map_err(|e| match e {
            InvalidSubscriber::Email(_) => {
                SubscribeError::ValidationError("Please provide a valid email address".into())
            }
            other => SubscribeError::ValidationError(other.to_string()),
        })?;
    tracing::Span::current().record(
        "subscriber_email",
        &tracing::field::display(&new_subscriber.email),
    );

    let outcome = waitlist.add(&new_subscriber).await?;
    if outcome == InsertOutcome::Duplicate {
        tracing::info!("Duplicate signup attempt");
        return Err(SubscribeError::AlreadySubscribed);
    }

    let confirmation_email_sent = match email_client.get_ref() {
        Some(email_client) => match send_confirmation_email(email_client, &new_subscriber).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error.cause_chain = ?e, "Failed to send the confirmation email");
                false
            }
        },
        None => false,
    };

    Ok(HttpResponse::Created().json(SubscribeResponse {
        success: true,
        message: "Great! You are on the waitlist. We will get back to you soon.",
        data: SubscribedData {
            email: new_subscriber.email.as_ref(),
            queued: outcome == InsertOutcome::Queued,
            confirmation_email_sent,
        },
    }))
}

/// CORS preflight for the signup form.
pub async fn subscribe_preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .finish()
}

#[tracing::instrument(
    name = "Send a confirmation email to a new subscriber",
    skip(email_client, new_subscriber)
)]
pub async fn send_confirmation_email(
    email_client: &EmailClient,
    new_subscriber: &NewSubscriber,
) -> Result<(), reqwest::Error> {
    let greeting_name = new_subscriber
        .name
        .as_ref()
        .map(|name| name.as_ref())
        .unwrap_or("there");
    let plain_body = format!(
        "Hi {},\n\nYou are on the waitlist! We will let you know as soon as we launch.",
        greeting_name
    );
    let html_body = format!(
        "Hi {},<br/><br/>\
        You are on the waitlist! We will let you know as soon as we launch.",
        htmlescape::encode_minimal(greeting_name)
    );
    email_client
        .send_email(
            &new_subscriber.email,
            "You're on the waitlist!",
            &html_body,
            &plain_body,
        )
        .await
}

fn client_ip(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .unwrap_or("unknown")
}

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
}
