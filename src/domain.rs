mod new_subscriber;
mod subscriber_email;
mod unsubscribe_token;

pub use new_subscriber::NewSubscriber;
pub use subscriber_email::SubscriberEmail;
pub use unsubscribe_token::UnsubscribeToken;
