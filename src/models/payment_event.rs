use serde::Deserialize;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_SESSION_EXPIRED: &str = "checkout.session.expired";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    CheckoutCompleted,
    CheckoutExpired,
    PaymentFailed,
    Other(String),
}

impl PaymentEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            CHECKOUT_SESSION_COMPLETED => PaymentEventKind::CheckoutCompleted,
            CHECKOUT_SESSION_EXPIRED => PaymentEventKind::CheckoutExpired,
            PAYMENT_INTENT_FAILED => PaymentEventKind::PaymentFailed,
            other => PaymentEventKind::Other(other.to_string()),
        }
    }
}

/// По какой ссылке искать бронирование.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalReference {
    BookingId(String),
    PaymentIntent(String),
}

/// Проверенное событие платежного провайдера. Не сохраняется.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub id: String,
    pub kind: PaymentEventKind,
    pub reference: Option<ExternalReference>,
    /// payment_intent из checkout-сессии, если провайдер его прислал.
    pub payment_intent_id: Option<String>,
    pub payload: serde_json::Value,
}

// Конверт события в формате провайдера
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

impl PaymentEvent {
    pub fn from_envelope(envelope: EventEnvelope, payload: serde_json::Value) -> Self {
        let kind = PaymentEventKind::from_type(&envelope.event_type);
        let object = &envelope.data.object;

        let (reference, payment_intent_id) = match kind {
            PaymentEventKind::CheckoutCompleted | PaymentEventKind::CheckoutExpired => {
                let intent = payment_intent_of(object);
                let booking_id = object
                    .pointer("/metadata/bookingId")
                    .and_then(|v| v.as_str())
                    .filter(|id| !id.is_empty())
                    .map(|id| ExternalReference::BookingId(id.to_string()));
                let reference =
                    booking_id.or_else(|| intent.clone().map(ExternalReference::PaymentIntent));
                (reference, intent)
            }
            PaymentEventKind::PaymentFailed => {
                let intent = string_field(object, "id");
                (intent.clone().map(ExternalReference::PaymentIntent), intent)
            }
            PaymentEventKind::Other(_) => (None, None),
        };

        PaymentEvent {
            id: envelope.id,
            kind,
            reference,
            payment_intent_id,
            payload,
        }
    }
}

fn string_field(object: &serde_json::Value, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// payment_intent может прийти строкой или развернутым объектом
fn payment_intent_of(object: &serde_json::Value) -> Option<String> {
    match object.get("payment_intent") {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(expanded @ serde_json::Value::Object(_)) => string_field(expanded, "id"),
        _ => None,
    }
}
