mod admin;
mod health_check;
mod subscriptions;
mod webhooks;

pub use admin::*;
pub use health_check::*;
pub use subscriptions::*;
pub use webhooks::*;

use actix_web::{error::InternalError, error::JsonPayloadError, HttpRequest, HttpResponse};

/// Body of every error response.
#[derive(serde::Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{}", cause)?;
        current = cause.source();
    }
    Ok(())
}

/// Error handler for the JSON extractor: a body that is not the expected
/// JSON never reaches a handler and is answered with a plain 400.
pub fn malformed_json(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::warn!(path = %req.path(), error = %err, "Rejected malformed JSON payload");
    let response = HttpResponse::BadRequest().json(ErrorBody::new("Invalid request format"));
    InternalError::from_response(err, response).into()
}
