use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiError,
    services::{lifecycle::EventOutcome, verifier::VerifyError},
    AppState,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/stripe", post(payment_webhook))
        .route("/bookings/{booking_id}/payment-status", get(get_payment_status))
}

/// POST /api/webhooks/stripe
///
/// Тело читается как сырые байты: подпись считается по ним, до любого парсинга.
#[tracing::instrument(name = "payment_webhook", skip_all, fields(event_id = tracing::field::Empty))]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Заголовок есть, но не читается как ASCII - это плохая подпись, а не отсутствующая
    let signature = headers
        .get(SIGNATURE_HEADER)
        .map(|value| value.to_str().map_err(|_| VerifyError::SignatureInvalid))
        .transpose()?;

    let event = state.verifier.verify(&body, signature)?;
    tracing::Span::current().record("event_id", tracing::field::display(&event.id));

    match state.processor.process(&event).await.map_err(ApiError::WebhookFailed)? {
        EventOutcome::Applied(booking) => {
            tracing::info!("Webhook {} applied to booking {}", event.id, booking.id);
        }
        EventOutcome::Unchanged => {
            tracing::debug!("Webhook {} changed nothing", event.id);
        }
        // Подтверждаем получение, иначе провайдер будет ретраить бесконечно
        EventOutcome::BookingNotFound | EventOutcome::Ignored => {}
    }

    Ok((StatusCode::OK, Json(json!({ "received": true }))))
}

/// GET /api/bookings/{booking_id}/payment-status
pub async fn get_payment_status(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .store
        .find_booking_by_reference(&booking_id)
        .await?
        .ok_or_else(|| ApiError::BookingNotFound(booking_id.clone()))?;

    Ok((StatusCode::OK, Json(json!({
        "booking_id": booking.id,
        "status": booking.status,
        "payment_status": booking.payment.status(),
        "paid_at": booking.payment.paid_at(),
        "payment_intent_id": booking.payment_intent_id,
    }))))
}
