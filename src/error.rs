use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::{services::verifier::VerifyError, store::StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("booking {0} not found")]
    BookingNotFound(String),
    #[error("webhook handling failed: {0}")]
    WebhookFailed(StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Verify(VerifyError::MissingSignature) => {
                (StatusCode::BAD_REQUEST, "Missing stripe-signature header")
            }
            ApiError::Verify(VerifyError::SignatureInvalid) => {
                (StatusCode::BAD_REQUEST, "Invalid signature")
            }
            ApiError::Verify(VerifyError::MalformedPayload(reason)) => {
                tracing::warn!("Rejected webhook payload: {}", reason);
                (StatusCode::BAD_REQUEST, "Invalid payload")
            }
            ApiError::BookingNotFound(_) => (StatusCode::NOT_FOUND, "Booking not found"),
            ApiError::WebhookFailed(e) => {
                tracing::error!("Webhook handler failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Webhook handler failed")
            }
            ApiError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
