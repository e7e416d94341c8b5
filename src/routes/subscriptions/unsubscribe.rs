use crate::{domain::UnsubscribeToken, store::SubscriberStore};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, serde::Deserialize)]
pub struct Parameters {
    token: String,
}

/// Endpoint linked from every broadcast email, removing the subscriber that
/// owns the token.
#[tracing::instrument(name = "Remove a subscriber", skip(db_pool, parameters))]
#[utoipa::path(
    get,
    path = "/subscriptions/unsubscribe",
    params(("token" = String, Query, description = "Unsubscribe token from the email")),
    responses(
        (status = OK, description = "Subscriber was removed"),
        (status = BAD_REQUEST, description = "Token is malformed"),
        (status = NOT_FOUND, description = "No subscriber owns the token"),
    )
)]
pub(crate) async fn unsubscribe(
    State(db_pool): State<Arc<PgPool>>,
    Query(parameters): Query<Parameters>,
) -> Result<&'static str, UnsubscribeError> {
    let token =
        UnsubscribeToken::parse(parameters.token).map_err(UnsubscribeError::MalformedToken)?;

    let removed = db_pool
        .remove_subscriber(&token)
        .await
        .map_err(UnsubscribeError::StoreError)?;

    if removed {
        tracing::info!("Subscriber has been removed");
        Ok("You have been unsubscribed")
    } else {
        Err(UnsubscribeError::UnknownToken)
    }
}

#[derive(thiserror::Error)]
pub enum UnsubscribeError {
    #[error("{0}")]
    MalformedToken(String),
    #[error("No subscriber owns this token")]
    UnknownToken,
    #[error("Failed to remove the subscriber")]
    StoreError(#[source] sqlx::Error),
}

impl IntoResponse for UnsubscribeError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MalformedToken(_) => StatusCode::BAD_REQUEST,
            Self::UnknownToken => StatusCode::NOT_FOUND,
            Self::StoreError(_) => {
                tracing::error!(
                    error.cause_chain = ?self,
                    error.message = %self,
                    "Unsubscribe request failed"
                );
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
