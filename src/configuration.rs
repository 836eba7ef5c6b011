use std::path::PathBuf;
use std::time::Duration;

use secrecy::Secret;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::domain::SubscriberEmail;
use crate::email_client::EmailClient;
use crate::fallback::FallbackLog;
use crate::retry::RetryPolicy;
use crate::store::SubscriberStore;
use crate::waitlist::Waitlist;

pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. `development` and `production` are acceptable.",
                other
            )),
        }
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub store: StoreSettings,
    pub email_client: EmailClientSettings,
    #[serde(default)]
    pub admin: AdminSettings,
}

#[derive(serde::Deserialize, Clone)]
pub struct ApplicationSettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub host: String,
}

#[derive(serde::Deserialize, Clone)]
pub struct StoreSettings {
    pub base_url: Option<String>,
    pub api_key: Option<Secret<String>>,
    pub table: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
    pub fallback_path: Option<PathBuf>,
    pub retry: RetrySettings,
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    /// `None` when either the URL or the API key is missing.
    pub fn client(&self) -> Option<SubscriberStore> {
        let base_url = self.base_url.clone().filter(|url| !url.trim().is_empty())?;
        let api_key = self.api_key.clone()?;
        Some(SubscriberStore::new(
            base_url,
            api_key,
            self.table.clone(),
            self.timeout(),
        ))
    }

    pub fn waitlist(&self) -> Waitlist {
        Waitlist::new(
            self.client(),
            self.fallback_path.clone().map(FallbackLog::new),
            self.retry.policy(),
        )
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_attempts: u32,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub base_delay_milliseconds: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_delay_milliseconds: u64,
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_milliseconds),
            Duration::from_millis(self.max_delay_milliseconds),
        )
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct EmailClientSettings {
    pub base_url: String,
    pub sender_email: String,
    pub authorization_token: Option<Secret<String>>,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl EmailClientSettings {
    pub fn sender(&self) -> Result<SubscriberEmail, String> {
        SubscriberEmail::parse(self.sender_email.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_milliseconds)
    }

    /// Confirmation emails are disabled when no authorization token is set.
    pub fn client(&self) -> Result<Option<EmailClient>, String> {
        let authorization_token = match &self.authorization_token {
            Some(token) => token.clone(),
            None => return Ok(None),
        };
        Ok(Some(EmailClient::new(
            self.base_url.clone(),
            self.sender()?,
            authorization_token,
            self.timeout(),
        )))
    }
}

#[derive(serde::Deserialize, Clone, Default)]
pub struct AdminSettings {
    pub secret: Option<Secret<String>>,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("RUST_ENV")
        .unwrap_or_else(|_| "development".into())
        .try_into()
        .expect("Failed to parse RUST_ENV");

    let environment_filename = format!("{}.yaml", environment.as_str());
    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")))
        .add_source(config::File::from(
            configuration_directory.join(environment_filename),
        ))
        // E.g. `APP_STORE__API_KEY=...` sets `Settings.store.api_key`
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
