use waitlist_intake::configuration::get_configuration;
use waitlist_intake::startup::Application;
use waitlist_intake::telemetry::{get_subscriber, init_subscriber};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Setting up Logging
    let subscriber = get_subscriber("waitlist-intake".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    // Panic if we cant read config
    let configuration = get_configuration().expect("Failed to read configuration");
    let application = Application::build(configuration).await?;
    application.run_until_stopped().await?;
    Ok(())
}
