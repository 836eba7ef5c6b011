use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberName(String);

impl SubscriberName {
    /// Returns an instance of `SubscriberName` if the trimmed input is
    /// non-empty and at most 256 graphemes long.
    pub fn parse(name: String) -> Result<SubscriberName, String> {
        let trimmed = name.trim();
        let is_empty = trimmed.is_empty();
        let is_too_long = trimmed.graphemes(true).count() > 256;

        if is_empty || is_too_long {
            return Err(format!("{} is not a valid subscriber name", name));
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl AsRef<str> for SubscriberName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
