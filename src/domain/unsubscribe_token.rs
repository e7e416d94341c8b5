use rand::{distributions::Alphanumeric, thread_rng, Rng};

const TOKEN_LENGTH: usize = 25;

/// Opaque token embedded in every broadcast email so the recipient can leave
/// the mailing list without any other credentials.
///
/// The only ways to obtain an `UnsubscribeToken` are to generate a new one or
/// to parse a string with the expected shape, so consumers can rely on it
/// being 25 ASCII alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeToken(String);

impl UnsubscribeToken {
    /// Generate a random 25-characters-long case-sensitive token.
    pub fn generate() -> Self {
        let mut rng = thread_rng();
        let token = std::iter::repeat_with(|| rng.sample(Alphanumeric))
            .map(char::from)
            .take(TOKEN_LENGTH)
            .collect();

        Self(token)
    }

    /// Returns an instance of `UnsubscribeToken` if the input looks like a
    /// token this service could have generated.
    pub fn parse(s: String) -> Result<Self, String> {
        let has_expected_length = s.chars().count() == TOKEN_LENGTH;
        let is_alphanumeric = s.chars().all(|c| c.is_ascii_alphanumeric());

        if has_expected_length && is_alphanumeric {
            Ok(Self(s))
        } else {
            Err(format!("{s} is not a valid unsubscribe token."))
        }
    }
}

impl AsRef<str> for UnsubscribeToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
