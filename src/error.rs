use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Domain error taxonomy. Every handler returns `Result<_, ApiError>`; the
/// `IntoResponse` impl maps each kind to a status code and a JSON body
/// carrying the kind plus a human-readable message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("Please verify your email address")]
    Unverified,
    #[error("Invalid verification code")]
    InvalidCode,
    #[error("Verification code has expired")]
    ExpiredCode,
    #[error("Email already verified")]
    AlreadyVerified,
    #[error("Cart is empty")]
    EmptyCart,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidCode
            | Self::ExpiredCode
            | Self::AlreadyVerified
            | Self::EmptyCart => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unverified => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Unverified => "unverified",
            Self::InvalidCode => "invalid_code",
            Self::ExpiredCode => "expired_code",
            Self::AlreadyVerified => "already_verified",
            Self::EmptyCart => "empty_cart",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Unexpected failures are logged with full context and surfaced to
        // the client as an opaque internal error.
        let message = match &self {
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "error": self.kind(),
            "message": message,
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_of(ApiError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::Conflict("dup".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApiError::NotFound("missing".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::Unauthorized("no".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_of(ApiError::Unverified), StatusCode::FORBIDDEN);
        assert_eq!(status_of(ApiError::InvalidCode), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::ExpiredCode), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::EmptyCart), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(ApiError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_conflict_maps_to_conflict() {
        let err: ApiError = StoreError::Conflict("cart entry".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
