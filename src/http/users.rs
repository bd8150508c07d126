//! User registration.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::http::request::JsonBody;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::mailer::{send_with_retry, Message};
use crate::models::user::validate_user;
use crate::models::{NewUser, Validator};
use crate::store::{StoreError, VersionedStore};

pub async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewUser>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut v = Validator::new();
    validate_user(&mut v, &input);
    v.into_result().map_err(ApiError::FailedValidation)?;

    let user = match state.users.insert(input) {
        Ok(user) => user,
        Err(StoreError::Duplicate(_)) => {
            let mut v = Validator::new();
            v.add_error("email", "a user with this email address already exists");
            return Err(ApiError::FailedValidation(v));
        }
    };
    tracing::info!(user_id = user.id, "user registered");

    let mailer = Arc::clone(&state.mailer);
    let config = state.config.mailer.clone();
    let message = Message::welcome(&config.sender, &user);
    state.tasks.spawn("welcome_email", async move {
        send_with_retry(mailer.as_ref(), &message, &config).await
    });

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}
