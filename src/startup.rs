use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::middleware::DefaultHeaders;
use actix_web::http::{header, Method};
use actix_web::web::{self, Data};
use actix_web::{App, HttpServer};
use anyhow::Context;
use secrecy::Secret;
use tracing_actix_web::TracingLogger;

use crate::configuration::Settings;
use crate::email_client::EmailClient;
use crate::routes::*;
use crate::waitlist::Waitlist;

/// Bearer secret guarding the admin endpoints.
pub struct AdminSecret(pub Option<Secret<String>>);

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(configuration: Settings) -> Result<Self, anyhow::Error> {
        let waitlist = configuration.store.waitlist();
        if !waitlist.is_configured() {
            tracing::warn!("Store URL or API key missing, signups will be refused");
        }
        let email_client = configuration
            .email_client
            .client()
            .map_err(|e| anyhow::anyhow!(e))
            .context("Invalid sender email address")?;
        if email_client.is_none() {
            tracing::info!("No email authorization token, confirmation emails are disabled");
        }
        let admin_secret = AdminSecret(configuration.admin.secret);

        let address = format!(
            "{}:{}",
            configuration.application.host, configuration.application.port
        );
        let listener = TcpListener::bind(&address)
            .with_context(|| format!("Failed to bind {}", address))?;
        let port = listener.local_addr()?.port();
        let server = run(listener, waitlist, email_client, admin_secret)?;

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

pub fn run(
    listener: TcpListener,
    waitlist: Waitlist,
    email_client: Option<EmailClient>,
    admin_secret: AdminSecret,
) -> Result<Server, std::io::Error> {
    let waitlist = Data::new(waitlist);
    let email_client = Data::new(email_client);
    let admin_secret = Data::new(admin_secret);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::JsonConfig::default().error_handler(malformed_json))
            .route("/health_check", web::get().to(health_check))
            .service(
                web::resource("/subscribe")
                    .route(web::post().to(subscribe))
                    .route(web::method(Method::OPTIONS).to(subscribe_preflight))
                    .wrap(DefaultHeaders::new().add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))),
            )
            .route("/admin/sync-subscriptions", web::post().to(sync_subscriptions))
            .service(
                web::resource("/webhooks/resend")
                    .route(web::post().to(email_events))
                    .route(web::method(Method::OPTIONS).to(email_events_preflight)),
            )
            .app_data(waitlist.clone())
            .app_data(email_client.clone())
            .app_data(admin_secret.clone())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
