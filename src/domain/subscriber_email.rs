use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    /// Returns the trimmed, lowercased address if it has the
    /// `local@domain.tld` shape. Anything else is rejected.
    pub fn parse(email: String) -> Result<SubscriberEmail, String> {
        let trimmed = email.trim();
        if !has_email_shape(trimmed) {
            return Err(format!("{} is not a valid subscriber email.", email));
        }
        Ok(Self(trimmed.to_lowercase()))
    }
}

/// Equivalent to `^[^\s@]+@[^\s@]+\.[^\s@]+$`.
fn has_email_shape(candidate: &str) -> bool {
    if candidate.chars().any(|c| c.is_whitespace() || c == '\u{feff}') {
        return false;
    }
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // needs a dot with at least one character on each side
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + c.len_utf8() < domain.len())
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriberEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
