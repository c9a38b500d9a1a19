use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{BookingStore, StoreError};
use crate::models::{Booking, BookingPatch};

#[derive(Debug, Default)]
pub struct MemoryBookingStore {
    bookings: RwLock<HashMap<String, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет бронирование (сидирование, тесты).
    pub async fn insert(&self, booking: Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.write().await;
        if let Some(intent) = &booking.payment_intent_id {
            ensure_intent_free(&bookings, &booking.id, intent)?;
        }
        bookings.insert(booking.id.clone(), booking);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Booking> {
        self.bookings.read().await.get(id).cloned()
    }
}

fn ensure_intent_free(
    bookings: &HashMap<String, Booking>,
    owner: &str,
    intent: &str,
) -> Result<(), StoreError> {
    let taken = bookings
        .values()
        .any(|b| b.id != owner && b.payment_intent_id.as_deref() == Some(intent));
    if taken {
        return Err(StoreError::Conflict(format!(
            "payment intent {} already belongs to another booking",
            intent
        )));
    }
    Ok(())
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn find_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.read().await.get(reference).cloned())
    }

    async fn find_booking_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .bookings
            .read()
            .await
            .values()
            .find(|b| b.payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn update_booking(&self, id: &str, patch: &BookingPatch) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.write().await;

        if let Some(intent) = &patch.payment_intent_id {
            let current = bookings.get(id).and_then(|b| b.payment_intent_id.as_deref());
            if current.is_none() {
                ensure_intent_free(&bookings, id, intent)?;
            }
        }

        let booking = bookings
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply_to(booking, Utc::now());
        Ok(booking.clone())
    }
}
