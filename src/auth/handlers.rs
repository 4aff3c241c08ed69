use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{JwtKeys, LoginRequest, LoginResponse, PublicUser, SignupRequest, VerifyEmailRequest},
        services::{self, CurrentUser},
    },
    dto::SuccessResponse,
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[instrument(skip(state, payload))]
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let user = services::register(state.store.as_ref(), &state.mailer, payload).await?;
    Ok(Json(SuccessResponse::with_data(
        "Account created successfully! Please check your email for verification code.",
        json!({ "email": user.email, "verification_required": true }),
    )))
}

#[instrument(skip(state, payload))]
async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    services::verify_email(state.store.as_ref(), payload).await?;
    Ok(Json(SuccessResponse::new(
        "Email verified successfully! You can now login.",
    )))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = services::authenticate(state.store.as_ref(), &payload.email, &payload.password)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login with unknown email or bad password");
            ApiError::Unauthorized("Invalid email or password".into())
        })?;

    if !user.is_verified {
        warn!(user_id = %user.id, "login before email verification");
        return Err(ApiError::Unverified);
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign_session(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer",
        user: user.into(),
    }))
}

#[instrument(skip_all)]
async fn me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_serialization_hides_nothing_it_should_show() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            email: "test@example.com".to_string(),
            is_verified: true,
            profile: crate::models::UserProfile::default(),
            created_at: time::OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("is_verified"));
    }
}
