use std::fmt::Display;

use validator::validate_email;

/// Represents a valid email to a subscriber.
///
/// Emails are normalized on parse: surrounding whitespace is trimmed and the
/// whole address is lowercased, so two spellings of the same address map to a
/// single stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberEmail(String);

impl SubscriberEmail {
    pub fn parse(s: String) -> Result<Self, String> {
        let normalized = s.trim().to_lowercase();
        if validate_email(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(format!("{s} is not a valid subscriber email."))
        }
    }
}

impl Display for SubscriberEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for SubscriberEmail {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
