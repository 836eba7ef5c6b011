use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, Secret};

use crate::domain::SubscriberEmail;

pub struct EmailClient {
    http_client: Client,
    base_url: String,
    sender: SubscriberEmail,
    authorization_token: Secret<String>,
}

#[derive(serde::Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl EmailClient {
    pub fn new(
        base_url: String,
        sender: SubscriberEmail,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Self {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build the email HTTP client");
        Self {
            http_client,
            base_url,
            sender,
            authorization_token,
        }
    }

    #[tracing::instrument(
        name = "Sending an email",
        skip(self, recipient, html_content, text_content),
        fields(recipient = %recipient)
    )]
    pub async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), reqwest::Error> {
        let url = format!("{}/emails", self.base_url.trim_end_matches('/'));
        let request_body = SendEmailRequest {
            from: self.sender.as_ref(),
            to: vec![recipient.as_ref()],
            subject,
            html: html_content,
            text: text_content,
        };
        self.http_client
            .post(&url)
            .bearer_auth(self.authorization_token.expose_secret())
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
