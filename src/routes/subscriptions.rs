pub(crate) mod unsubscribe;

use crate::{
    domain::{NewSubscriber, SubscriberEmail},
    state::AppState,
    store::{InsertOutcome, SubscriberStore},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, serde::Deserialize)]
struct FormData {
    email: String,
}

impl TryFrom<FormData> for NewSubscriber {
    type Error = String;

    fn try_from(value: FormData) -> Result<Self, Self::Error> {
        let email = SubscriberEmail::parse(value.email)?;

        Ok(Self::new(email))
    }
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct SubscribeResponse {
    success: bool,
    message: &'static str,
}

/// Create a router to serve endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(subscribe))
        .route("/unsubscribe", get(unsubscribe::unsubscribe))
}

/// Subscribe to the New Year broadcast with an email. Subscribing an email
/// that is already on the list succeeds as well.
#[tracing::instrument(
    name = "Adding a new subscriber",
    skip(form, pool),
    fields(subscriber_email = %form.email)
)]
#[utoipa::path(
    post,
    path = "/subscriptions",
    responses(
        (status = OK, description = "Email is on the list", body = SubscribeResponse),
        (status = UNPROCESSABLE_ENTITY, description = "Email is missing or invalid"),
        (status = INTERNAL_SERVER_ERROR, description = "Subscriber could not be stored"),
    )
)]
async fn subscribe(
    State(pool): State<Arc<PgPool>>,
    Form(form): Form<FormData>,
) -> Result<Json<SubscribeResponse>, SubscribeError> {
    let new_subscriber: NewSubscriber =
        form.try_into().map_err(SubscribeError::ValidationError)?;

    let outcome = insert_subscriber(&*pool, &new_subscriber).await?;
    if outcome == InsertOutcome::AlreadySubscribed {
        tracing::info!("Email was already subscribed");
    }

    Ok(Json(SubscribeResponse {
        success: true,
        message: "Subscribed successfully",
    }))
}

/// Store the subscriber, treating an already stored email as a success.
pub(crate) async fn insert_subscriber(
    store: &dyn SubscriberStore,
    new_subscriber: &NewSubscriber,
) -> Result<InsertOutcome, SubscribeError> {
    store
        .insert_subscriber(new_subscriber)
        .await
        .map_err(SubscribeError::StoreError)
}

#[derive(thiserror::Error)]
pub enum SubscribeError {
    #[error("{0}")]
    ValidationError(String),
    #[error("Failed to store the new subscriber")]
    StoreError(#[source] sqlx::Error),
}

impl IntoResponse for SubscribeError {
    fn into_response(self) -> Response {
        match self {
            Self::ValidationError(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()).into_response()
            }
            Self::StoreError(_) => {
                tracing::error!(
                    error.cause_chain = ?self,
                    error.message = %self,
                    "Subscribe request failed"
                );
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}
