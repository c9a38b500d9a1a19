pub mod booking;
pub mod payment_event;

pub use booking::{Booking, BookingPatch, BookingStatus, PaymentState, PaymentStatus};
pub use payment_event::{ExternalReference, PaymentEvent, PaymentEventKind};
