use crate::configuration::BroadcastSettings;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use http::{
    header::{self, ToStrError},
    StatusCode,
};
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Proof that a request carried the pre-shared broadcast secret, either as
/// `Authorization: Bearer <secret>` or as a `secret` query parameter.
///
/// When the header is present it is the only place looked at.
#[derive(Debug)]
pub struct SharedSecret;

#[derive(Debug, serde::Deserialize)]
struct SecretQuery {
    secret: Option<String>,
}

impl SharedSecret {
    /// Compare a candidate against the expected secret in constant time.
    /// A blank secret on either side never matches.
    fn verify(candidate: &Secret<String>, expected: &Secret<String>) -> Result<Self, SecretError> {
        if candidate.expose_secret().trim().is_empty() {
            return Err(SecretError::MissingSecret);
        }
        if expected.expose_secret().trim().is_empty() {
            return Err(SecretError::InvalidSecret);
        }

        let matches: bool = candidate
            .expose_secret()
            .as_bytes()
            .ct_eq(expected.expose_secret().as_bytes())
            .into();

        if matches {
            Ok(Self)
        } else {
            Err(SecretError::InvalidSecret)
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SharedSecret
where
    Arc<BroadcastSettings>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = SecretError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let settings = Arc::<BroadcastSettings>::from_ref(state);

        let candidate = match parts.headers.get(header::AUTHORIZATION) {
            Some(header_value) => {
                let header_value = header_value
                    .to_str()
                    .map_err(SecretError::NotValidUTF8String)?;
                bearer_token(header_value)?.to_string()
            }
            None => Query::<SecretQuery>::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|Query(query)| query.secret)
                .ok_or(SecretError::MissingSecret)?,
        };

        let outcome = Self::verify(&Secret::new(candidate), &settings.secret);
        if outcome.is_err() {
            tracing::warn!("Rejected a request with an invalid shared secret");
        }
        outcome
    }
}

/// Token of a `Bearer` authorization header. The scheme is matched
/// case-insensitively.
fn bearer_token(header_value: &str) -> Result<&str, SecretError> {
    match header_value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => Ok(token.trim()),
        _ => Err(SecretError::SchemeNotBearer),
    }
}

pub fn build_auth_error(body: String) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, r#"Bearer realm="broadcast""#)],
        body,
    )
        .into_response()
}

#[derive(thiserror::Error)]
pub enum SecretError {
    #[error("No secret was provided in the 'Authorization' header or query")]
    MissingSecret,
    #[error("The 'Authorization' header was not a valid UTF8 string")]
    NotValidUTF8String(#[source] ToStrError),
    #[error("The authorization scheme was not 'Bearer'")]
    SchemeNotBearer,
    #[error("The provided secret is invalid")]
    InvalidSecret,
}

impl IntoResponse for SecretError {
    fn into_response(self) -> Response {
        build_auth_error(self.to_string())
    }
}
