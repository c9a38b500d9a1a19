//! verifier.rs
//!
//! Проверка подлинности вебхуков платежного провайдера.
//!
//! Заголовок подписи имеет вид `t=<unix-время>,v1=<hex>[,v1=<hex>...]`.
//! Подписывается строка `"{t}." + сырое тело запроса` алгоритмом HMAC-SHA256
//! на общем секрете. Тело разбирается как JSON только после успешной проверки.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::{
    config::{ConfigError, PaymentConfig},
    models::{payment_event::EventEnvelope, PaymentEvent},
};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("signature header is missing")]
    MissingSignature,
    #[error("signature is invalid")]
    SignatureInvalid,
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Проверяет подпись и декодирует событие.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    /// Пустой секрет - ошибка конфигурации, проверку подписи нельзя пропускать.
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Result<Self, ConfigError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET"));
        }
        if tolerance_secs < 0 {
            return Err(ConfigError::Invalid {
                key: "STRIPE_WEBHOOK_TOLERANCE_SECS",
                value: tolerance_secs.to_string(),
            });
        }
        Ok(Self { secret, tolerance_secs })
    }

    pub fn from_config(config: &PaymentConfig) -> Result<Self, ConfigError> {
        Self::new(config.webhook_secret.clone(), config.signature_tolerance_secs)
    }

    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<PaymentEvent, VerifyError> {
        self.verify_at(payload, signature, Utc::now().timestamp())
    }

    /// То же, что [`verify`](Self::verify), но с явным текущим временем.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<PaymentEvent, VerifyError> {
        let header = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(VerifyError::MissingSignature)?;

        let parsed = parse_header(header)?;

        // t= приходит от клиента: разница может не влезть в i64
        let stale = now
            .checked_sub(parsed.timestamp)
            .map_or(true, |age| age.unsigned_abs() > self.tolerance_secs.unsigned_abs());
        if stale {
            warn!(timestamp = parsed.timestamp, now, "Webhook timestamp outside tolerance");
            return Err(VerifyError::SignatureInvalid);
        }

        let mac = self.mac_for(parsed.timestamp_raw, payload);
        let matched = parsed
            .signatures
            .iter()
            .filter_map(|sig| hex::decode(sig).ok())
            .any(|expected| mac.clone().verify_slice(&expected).is_ok());

        if !matched {
            warn!("Webhook signature mismatch");
            return Err(VerifyError::SignatureInvalid);
        }

        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;
        let envelope: EventEnvelope = serde_json::from_value(value.clone())
            .map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;

        debug!(event_id = %envelope.id, event_type = %envelope.event_type, "Webhook verified");
        Ok(PaymentEvent::from_envelope(envelope, value))
    }

    /// Строит корректный заголовок подписи для тела (локальные утилиты, тесты).
    pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> String {
        let timestamp_raw = timestamp.to_string();
        let signature = hex::encode(self.mac_for(&timestamp_raw, payload).finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }

    /// Подписывается текст `t=` ровно в том виде, в каком он пришел в заголовке.
    fn mac_for(&self, timestamp_raw: &str, payload: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp_raw.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }
}

struct SignatureHeader<'a> {
    timestamp: i64,
    timestamp_raw: &'a str,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, VerifyError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok().map(|parsed| (parsed, value));
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some((timestamp, timestamp_raw)) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            timestamp_raw,
            signatures,
        }),
        _ => Err(VerifyError::SignatureInvalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: i64 = 1_780_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new("whsec_test_secret", DEFAULT_TOLERANCE_SECS).unwrap()
    }

    fn payload() -> Vec<u8> {
        br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{"metadata":{"bookingId":"B1"}}}}"#
            .to_vec()
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            WebhookVerifier::new("", DEFAULT_TOLERANCE_SECS),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn valid_signature_is_accepted() {
        let v = verifier();
        let body = payload();
        let header = v.signature_header(&body, NOW);

        let event = v.verify_at(&body, Some(&header), NOW).unwrap();
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn any_matching_v1_entry_is_accepted() {
        let v = verifier();
        let body = payload();
        let good = v.signature_header(&body, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={},v0=legacy", NOW, "00".repeat(32), good_sig);

        assert!(v.verify_at(&body, Some(&header), NOW).is_ok());
    }

    #[test]
    fn missing_header_is_reported() {
        let v = verifier();
        assert!(matches!(
            v.verify_at(&payload(), None, NOW),
            Err(VerifyError::MissingSignature)
        ));
        assert!(matches!(
            v.verify_at(&payload(), Some("  "), NOW),
            Err(VerifyError::MissingSignature)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = WebhookVerifier::new("whsec_other", DEFAULT_TOLERANCE_SECS).unwrap();
        let body = payload();
        let header = other.signature_header(&body, NOW);

        assert!(matches!(
            verifier().verify_at(&body, Some(&header), NOW),
            Err(VerifyError::SignatureInvalid)
        ));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let v = verifier();
        let body = payload();
        let header = v.signature_header(&body, NOW - DEFAULT_TOLERANCE_SECS - 1);

        assert!(matches!(
            v.verify_at(&body, Some(&header), NOW),
            Err(VerifyError::SignatureInvalid)
        ));
    }

    #[test]
    fn garbled_header_is_rejected() {
        let v = verifier();
        for header in ["v1=abc", "t=notanumber,v1=abcd", "t=1780000000", "nonsense"] {
            assert!(matches!(
                v.verify_at(&payload(), Some(header), NOW),
                Err(VerifyError::SignatureInvalid)
            ));
        }
    }

    #[test]
    fn signed_garbage_is_malformed_payload() {
        let v = verifier();
        let body = b"not json at all".to_vec();
        let header = v.signature_header(&body, NOW);
        assert!(matches!(
            v.verify_at(&body, Some(&header), NOW),
            Err(VerifyError::MalformedPayload(_))
        ));

        let body = br#"{"id":"evt_1"}"#.to_vec();
        let header = v.signature_header(&body, NOW);
        assert!(matches!(
            v.verify_at(&body, Some(&header), NOW),
            Err(VerifyError::MalformedPayload(_))
        ));
    }

    #[test]
    fn extreme_timestamps_are_rejected() {
        let v = verifier();
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1={}", t, "00".repeat(32));
            assert!(matches!(
                v.verify_at(&payload(), Some(&header), NOW),
                Err(VerifyError::SignatureInvalid)
            ));
        }
        assert!(matches!(
            v.verify_at(&payload(), Some("t=-9223372036854775808,v1=00"), i64::MAX),
            Err(VerifyError::SignatureInvalid)
        ));
    }

    #[test]
    fn timestamp_text_is_signed_as_sent() {
        let v = verifier();
        let body = payload();
        let raw = format!("0{}", NOW);

        let mut mac = HmacSha256::new_from_slice(b"whsec_test_secret").unwrap();
        mac.update(raw.as_bytes());
        mac.update(b".");
        mac.update(&body);
        let signature = hex::encode(mac.finalize().into_bytes());

        let header = format!("t={},v1={}", raw, signature);
        assert!(v.verify_at(&body, Some(&header), NOW).is_ok());

        // та же подпись с нормализованным t= уже не совпадает
        let normalized = format!("t={},v1={}", NOW, signature);
        assert!(matches!(
            v.verify_at(&body, Some(&normalized), NOW),
            Err(VerifyError::SignatureInvalid)
        ));
    }

    proptest! {
        #[test]
        fn tampered_payload_never_verifies(index in 0usize..96, flip in 1u8..=255) {
            let v = verifier();
            let body = payload();
            let header = v.signature_header(&body, NOW);

            let mut tampered = body.clone();
            let i = index % tampered.len();
            tampered[i] ^= flip;

            prop_assert!(matches!(
                v.verify_at(&tampered, Some(&header), NOW),
                Err(VerifyError::SignatureInvalid)
            ));
        }

        #[test]
        fn tampered_signature_never_verifies(index in 0usize..64, digit in 0u32..16) {
            let v = verifier();
            let body = payload();
            let header = v.signature_header(&body, NOW);
            let sig = header.split("v1=").nth(1).unwrap().to_string();

            let mut chars: Vec<char> = sig.chars().collect();
            let replacement = std::char::from_digit(digit, 16).unwrap();
            prop_assume!(chars[index] != replacement);
            chars[index] = replacement;
            let forged = format!("t={},v1={}", NOW, chars.into_iter().collect::<String>());

            prop_assert!(matches!(
                v.verify_at(&body, Some(&forged), NOW),
                Err(VerifyError::SignatureInvalid)
            ));
        }
    }
}
