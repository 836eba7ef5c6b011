use unicode_segmentation::UnicodeSegmentation;

use super::{SubscriberEmail, SubscriberName};

/// Tag recorded for signups coming through the public form.
pub const DEFAULT_SOURCE: &str = "coming-soon-page";
/// Tag recorded for records replayed through the admin backfill.
pub const ADMIN_SYNC_SOURCE: &str = "admin-sync";

#[derive(Debug, Clone)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub name: Option<SubscriberName>,
    pub source: SubscriptionSource,
}

#[derive(thiserror::Error, Debug)]
pub enum InvalidSubscriber {
    #[error("{0}")]
    Email(String),
    #[error("{0}")]
    Name(String),
    #[error("{0}")]
    Source(String),
}

impl NewSubscriber {
    /// A blank name is treated as absent, a blank source falls back to
    /// `default_source`.
    pub fn parse(
        email: Option<String>,
        name: Option<String>,
        source: Option<String>,
        default_source: &'static str,
    ) -> Result<NewSubscriber, InvalidSubscriber> {
        let email = SubscriberEmail::parse(email.unwrap_or_default())
            .map_err(InvalidSubscriber::Email)?;
        let name = match name.filter(|n| !n.trim().is_empty()) {
            Some(name) => Some(SubscriberName::parse(name).map_err(InvalidSubscriber::Name)?),
            None => None,
        };
        let source =
            SubscriptionSource::parse(source, default_source).map_err(InvalidSubscriber::Source)?;

        Ok(Self {
            email,
            name,
            source,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SubscriptionSource(String);

impl SubscriptionSource {
    pub fn parse(
        source: Option<String>,
        default_source: &'static str,
    ) -> Result<SubscriptionSource, String> {
        let source = match source {
            Some(s) if !s.trim().is_empty() => s,
            _ => return Ok(Self(default_source.to_string())),
        };
        let trimmed = source.trim();
        if trimmed.graphemes(true).count() > 64 {
            return Err(format!("{} is not a valid signup source", source));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for SubscriptionSource {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
