//! Хранилище бронирований.
//!
//! Обработчик вебхука работает только через трейт [`BookingStore`]:
//! в проде это Postgres ([`postgres::PgBookingStore`]), в тестах - память
//! ([`memory::MemoryBookingStore`]). Все операции атомарны в пределах одной строки.

use async_trait::async_trait;

use crate::models::{Booking, BookingPatch};

pub mod memory;
pub mod postgres;

pub use memory::MemoryBookingStore;
pub use postgres::PgBookingStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("booking {0} not found")]
    NotFound(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("corrupt booking record: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Поиск по идентификатору бронирования.
    async fn find_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError>;

    /// Обратный поиск по payment_intent_id провайдера.
    async fn find_booking_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, StoreError>;

    async fn update_booking(&self, id: &str, patch: &BookingPatch) -> Result<Booking, StoreError>;
}
