//! lifecycle.rs
//!
//! Жизненный цикл оплаты бронирования.
//!
//! 1.  [`reduce`] - чистая функция `(бронирование, событие, now) -> (патч, уведомления)`.
//!     Вся таблица переходов живет здесь.
//! 2.  [`PaymentEventProcessor`] - находит бронирование по ссылке из события,
//!     вызывает редьюсер и сохраняет патч.
//!
//! Повторная доставка того же события провайдером должна быть безопасной:
//! повторный `checkout-completed` для оплаченного бронирования дает пустой переход,
//! остальные переходы пишут фиксированные значения.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    models::{
        Booking, BookingPatch, BookingStatus, ExternalReference, PaymentEvent, PaymentEventKind,
        PaymentState,
    },
    store::{BookingStore, StoreError},
};

/// Побочные эффекты перехода. Доставка (email и т.п.) вне этого сервиса.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BookingConfirmed { booking_id: String, paid_at: DateTime<Utc> },
    PaymentFailed { booking_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub patch: Option<BookingPatch>,
    pub notifications: Vec<Notification>,
}

impl Transition {
    fn none() -> Self {
        Self::default()
    }
}

pub fn reduce(booking: &Booking, event: &PaymentEvent, now: DateTime<Utc>) -> Transition {
    match (&event.kind, booking.payment) {
        // Повторная доставка completed ничего не меняет
        (PaymentEventKind::CheckoutCompleted, PaymentState::Completed { .. }) => Transition::none(),

        (PaymentEventKind::CheckoutCompleted, _) => {
            let payment_intent_id = match booking.payment_intent_id {
                Some(_) => None,
                None => event.payment_intent_id.clone(),
            };
            Transition {
                patch: Some(BookingPatch {
                    status: Some(BookingStatus::Confirmed),
                    payment: Some(PaymentState::Completed { paid_at: now }),
                    payment_intent_id,
                }),
                notifications: vec![Notification::BookingConfirmed {
                    booking_id: booking.id.clone(),
                    paid_at: now,
                }],
            }
        }

        // Статус бронирования не трогаем, paid_at уходит вместе с Completed
        (PaymentEventKind::CheckoutExpired, _) => Transition {
            patch: Some(BookingPatch {
                payment: Some(PaymentState::Pending),
                ..Default::default()
            }),
            notifications: Vec::new(),
        },

        (PaymentEventKind::PaymentFailed, previous) => Transition {
            patch: Some(BookingPatch {
                payment: Some(PaymentState::Failed),
                ..Default::default()
            }),
            notifications: if previous == PaymentState::Failed {
                Vec::new()
            } else {
                vec![Notification::PaymentFailed {
                    booking_id: booking.id.clone(),
                }]
            },
        },

        (PaymentEventKind::Other(_), _) => Transition::none(),
    }
}

/// Результат обработки одного события.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(Booking),
    Unchanged,
    BookingNotFound,
    Ignored,
}

#[derive(Clone)]
pub struct PaymentEventProcessor {
    store: Arc<dyn BookingStore>,
}

impl PaymentEventProcessor {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub async fn process(&self, event: &PaymentEvent) -> Result<EventOutcome, StoreError> {
        self.process_at(event, Utc::now()).await
    }

    pub async fn process_at(
        &self,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, StoreError> {
        if let PaymentEventKind::Other(event_type) = &event.kind {
            debug!(event_id = %event.id, %event_type, "Unhandled payment event type");
            return Ok(EventOutcome::Ignored);
        }

        let booking = match self.locate(event).await? {
            Some(booking) => booking,
            None => {
                warn!(
                    event_id = %event.id,
                    reference = ?event.reference,
                    "Booking for payment event not found"
                );
                return Ok(EventOutcome::BookingNotFound);
            }
        };

        let transition = reduce(&booking, event, now);
        let patch = match transition.patch {
            Some(patch) if !patch.is_empty() => patch,
            _ => {
                debug!(event_id = %event.id, booking_id = %booking.id, "Payment event is a no-op");
                return Ok(EventOutcome::Unchanged);
            }
        };

        let updated = self.store.update_booking(&booking.id, &patch).await?;
        info!(
            event_id = %event.id,
            booking_id = %updated.id,
            status = %updated.status,
            payment_status = %updated.payment.status(),
            "Booking updated from payment event"
        );

        for notification in &transition.notifications {
            info!(?notification, "Booking notification");
        }

        Ok(EventOutcome::Applied(updated))
    }

    async fn locate(&self, event: &PaymentEvent) -> Result<Option<Booking>, StoreError> {
        match &event.reference {
            Some(ExternalReference::BookingId(id)) => self.store.find_booking_by_reference(id).await,
            Some(ExternalReference::PaymentIntent(id)) => {
                self.store.find_booking_by_payment_intent_id(id).await
            }
            None => Ok(None),
        }
    }
}
