use super::{SubscriberEmail, UnsubscribeToken};

/// Represents a new subscriber and the token they can later use to leave the
/// mailing list.
#[derive(Debug)]
pub struct NewSubscriber {
    pub email: SubscriberEmail,
    pub unsubscribe_token: UnsubscribeToken,
}

impl NewSubscriber {
    /// Create a new subscriber with a freshly generated unsubscribe token.
    pub fn new(email: SubscriberEmail) -> Self {
        Self {
            email,
            unsubscribe_token: UnsubscribeToken::generate(),
        }
    }
}
