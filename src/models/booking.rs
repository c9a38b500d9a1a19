use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Плоское представление статуса оплаты (так он хранится в БД и отдается в API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Состояние оплаты бронирования.
///
/// Время оплаты живет только внутри `Completed`, поэтому комбинация
/// "оплачено, но без paid_at" непредставима.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Pending,
    Completed { paid_at: DateTime<Utc> },
    Failed,
}

impl PaymentState {
    pub fn status(&self) -> PaymentStatus {
        match self {
            PaymentState::Pending => PaymentStatus::Pending,
            PaymentState::Completed { .. } => PaymentStatus::Completed,
            PaymentState::Failed => PaymentStatus::Failed,
        }
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        match self {
            PaymentState::Completed { paid_at } => Some(*paid_at),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PaymentState::Completed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: BookingStatus,
    pub payment: PaymentState,
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Новое бронирование в состоянии PENDING/PENDING.
    pub fn new(id: impl Into<String>, check_in: NaiveDate, check_out: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            check_in,
            check_out,
            status: BookingStatus::Pending,
            payment: PaymentState::Pending,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_payment_intent(mut self, payment_intent_id: impl Into<String>) -> Self {
        self.payment_intent_id = Some(payment_intent_id.into());
        self
    }
}

/// Изменение бронирования, вычисленное редьюсером.
///
/// Все поля - записи фиксированных значений, поэтому повторное применение
/// того же патча не меняет результат.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingPatch {
    pub status: Option<BookingStatus>,
    pub payment: Option<PaymentState>,
    /// Применяется только если у бронирования еще нет payment_intent_id.
    pub payment_intent_id: Option<String>,
}

impl BookingPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment.is_none() && self.payment_intent_id.is_none()
    }

    /// Применяет патч к бронированию в памяти с теми же правилами, что и SQL-апдейт.
    pub fn apply_to(&self, booking: &mut Booking, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            booking.status = status;
        }
        if let Some(payment) = self.payment {
            booking.payment = match (booking.payment, payment) {
                // paid_at не сдвигается при повторном подтверждении
                (PaymentState::Completed { paid_at }, PaymentState::Completed { .. }) => {
                    PaymentState::Completed { paid_at }
                }
                (_, next) => next,
            };
        }
        if booking.payment_intent_id.is_none() {
            if let Some(intent) = &self.payment_intent_id {
                booking.payment_intent_id = Some(intent.clone());
            }
        }
        booking.updated_at = now;
    }
}

// Строка таблицы bookings
#[derive(Debug, Clone, FromRow)]
pub struct BookingRow {
    pub id: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub status: String,
    pub payment_status: String,
    pub payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = String;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status: BookingStatus = row.status.parse()?;
        let payment = match (row.payment_status.parse::<PaymentStatus>()?, row.paid_at) {
            (PaymentStatus::Pending, _) => PaymentState::Pending,
            (PaymentStatus::Failed, _) => PaymentState::Failed,
            (PaymentStatus::Completed, Some(paid_at)) => PaymentState::Completed { paid_at },
            (PaymentStatus::Completed, None) => {
                return Err(format!("booking {} is COMPLETED without paid_at", row.id));
            }
        };

        Ok(Booking {
            id: row.id,
            check_in: row.check_in,
            check_out: row.check_out,
            status,
            payment,
            payment_intent_id: row.payment_intent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking() -> Booking {
        Booking::new(
            "B1",
            NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
        )
    }

    fn row(payment_status: &str, paid_at: Option<DateTime<Utc>>) -> BookingRow {
        let now = Utc::now();
        BookingRow {
            id: "B1".to_string(),
            check_in: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
            status: "CONFIRMED".to_string(),
            payment_status: payment_status.to_string(),
            payment_intent_id: None,
            paid_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn completed_row_without_paid_at_is_rejected() {
        assert!(Booking::try_from(row("COMPLETED", None)).is_err());

        let paid_at = Utc::now();
        let booking = Booking::try_from(row("COMPLETED", Some(paid_at))).unwrap();
        assert_eq!(booking.payment, PaymentState::Completed { paid_at });
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut bad = row("PENDING", None);
        bad.status = "ARCHIVED".to_string();
        assert!(Booking::try_from(bad).is_err());
    }

    #[test]
    fn repeated_completion_keeps_first_paid_at() {
        let first = Utc::now();
        let mut booking = booking();
        let patch = BookingPatch {
            status: Some(BookingStatus::Confirmed),
            payment: Some(PaymentState::Completed { paid_at: first }),
            payment_intent_id: None,
        };
        patch.apply_to(&mut booking, first);

        let later = BookingPatch {
            payment: Some(PaymentState::Completed { paid_at: first + Duration::minutes(5) }),
            ..patch.clone()
        };
        later.apply_to(&mut booking, first + Duration::minutes(5));

        assert_eq!(booking.payment.paid_at(), Some(first));
    }

    #[test]
    fn payment_intent_is_never_overwritten() {
        let mut booking = booking().with_payment_intent("pi_original");
        let patch = BookingPatch {
            payment_intent_id: Some("pi_other".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut booking, Utc::now());
        assert_eq!(booking.payment_intent_id.as_deref(), Some("pi_original"));
    }
}
