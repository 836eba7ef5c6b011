use actix_web::{web, HttpRequest, HttpResponse};

#[derive(serde::Deserialize, Debug)]
pub struct EmailEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<EmailEventData>,
}

#[derive(serde::Deserialize, Debug)]
pub struct EmailEventData {
    email: Option<String>,
    #[serde(default)]
    to: Vec<String>,
}

impl EmailEventData {
    fn recipient(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or_else(|| self.to.first().map(String::as_str))
    }
}

/// Delivery notifications from the email provider. They are only logged.
#[tracing::instrument(
    name = "Receiving an email provider event",
    skip(event, request),
    fields(event_type = %event.kind)
)]
pub async fn email_events(event: web::Json<EmailEvent>, request: HttpRequest) -> HttpResponse {
    if request.headers().get("svix-signature").is_none() {
        tracing::warn!("Email provider event arrived without a signature");
    }
    let recipient = event.data.as_ref().and_then(EmailEventData::recipient);
    match (event.kind.as_str(), recipient) {
        ("email.sent" | "email.delivered", Some(recipient)) => {
            tracing::info!(recipient, "Email event processed");
        }
        (kind, _) => {
            tracing::debug!(kind, "Ignoring email event");
        }
    }
    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

pub async fn email_events_preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}
