//! Client for a Resend-compatible transactional email API.

use crate::{configuration::EmailClientSettings, domain::SubscriberEmail};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

#[derive(Debug)]
pub struct EmailClient {
    base_url: Url,
    sender: SubscriberEmail,
    sender_name: String,
    http_client: Client,
    authorization_token: Secret<String>,
}

impl EmailClient {
    /// Create a new email client. Every request is bounded by `timeout`.
    pub fn new(
        base_url: Url,
        sender: SubscriberEmail,
        sender_name: String,
        authorization_token: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url,
            sender,
            sender_name,
            http_client,
            authorization_token,
        })
    }

    /// Send a single email. Any non-2xx answer from the provider is reported
    /// as an error.
    #[tracing::instrument(
        name = "Send email through provider",
        skip_all,
        fields(recipient = %recipient)
    )]
    pub async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), EmailClientError> {
        let url = self
            .base_url
            .join("emails")
            .map_err(EmailClientError::InvalidUrl)?;
        let from = format!("{} <{}>", self.sender_name, self.sender);
        let request_body = SendEmailRequest {
            from: &from,
            to: [recipient.as_ref()],
            subject,
            html: html_body,
            text: text_body,
        };

        self.http_client
            .post(url)
            .bearer_auth(self.authorization_token.expose_secret())
            .json(&request_body)
            .send()
            .await
            .map_err(EmailClientError::RequestFailed)?
            .error_for_status()
            .map_err(EmailClientError::Rejected)?;

        Ok(())
    }
}

impl TryFrom<&EmailClientSettings> for EmailClient {
    type Error = String;

    fn try_from(config: &EmailClientSettings) -> Result<Self, Self::Error> {
        Self::new(
            config.url().map_err(|e| {
                tracing::error!("Unable to parse email client's base url: {e}");
                "Email base url is invalid".to_string()
            })?,
            config.sender()?,
            config.sender_name.clone(),
            config.authorization_token.clone(),
            config.timeout(),
        )
        .map_err(|e| {
            tracing::error!("Unable to build the http client: {e}");
            "Failed to build the http client for the email provider".to_string()
        })
    }
}

#[derive(Debug, serde::Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(thiserror::Error)]
pub enum EmailClientError {
    #[error("Unable to build the provider url")]
    InvalidUrl(#[source] url::ParseError),
    #[error("Failed to reach the email provider")]
    RequestFailed(#[source] reqwest::Error),
    #[error("The email provider rejected the email")]
    Rejected(#[source] reqwest::Error),
}
