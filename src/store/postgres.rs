use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use super::{BookingStore, StoreError};
use crate::models::{booking::BookingRow, Booking, BookingPatch};

const BOOKING_COLUMNS: &str = "id, check_in, check_out, status, payment_status, \
     payment_intent_id, paid_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running booking migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Booking>, StoreError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE {} = $1",
            BOOKING_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_booking).transpose()
    }
}

fn into_booking(row: BookingRow) -> Result<Booking, StoreError> {
    Booking::try_from(row).map_err(StoreError::Corrupt)
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_booking_by_reference(&self, reference: &str) -> Result<Option<Booking>, StoreError> {
        self.find_one("id", reference).await
    }

    async fn find_booking_by_payment_intent_id(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Booking>, StoreError> {
        self.find_one("payment_intent_id", payment_intent_id).await
    }

    async fn update_booking(&self, id: &str, patch: &BookingPatch) -> Result<Booking, StoreError> {
        let payment_status = patch.payment.map(|p| p.status().as_str());
        let paid_at = patch.payment.and_then(|p| p.paid_at()).unwrap_or_else(Utc::now);

        // Одна строка, один запрос: paid_at не перезаписывается повторным COMPLETED,
        // payment_intent_id выставляется только один раз.
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings SET
                status = COALESCE($2, status),
                payment_status = COALESCE($3, payment_status),
                paid_at = CASE
                    WHEN $3::text IS NULL THEN paid_at
                    WHEN $3::text = 'COMPLETED' THEN COALESCE(paid_at, $4)
                    ELSE NULL
                END,
                payment_intent_id = COALESCE(payment_intent_id, $5),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(payment_status)
        .bind(paid_at)
        .bind(patch.payment_intent_id.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        match row {
            Some(row) => into_booking(row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}
