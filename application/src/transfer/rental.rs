use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use kernel::prelude::entity::{Rental, RentalPaymentStatus, RentalStatus};

#[derive(Debug, Clone)]
pub struct RentalDto {
    pub id: Uuid,
    pub cycle_id: Uuid,
    pub renter: String,
    pub owner: String,
    pub hourly_rate: Decimal,
    pub started_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
    pub status: RentalStatus,
    pub duration_minutes: Option<i64>,
    pub distance_km: Option<Decimal>,
    pub total_cost: Decimal,
    pub payment_status: RentalPaymentStatus,
    pub rating: Option<i16>,
    pub review: Option<String>,
}

impl From<Rental> for RentalDto {
    fn from(value: Rental) -> Self {
        Self {
            id: (*value.id()).into(),
            cycle_id: (*value.cycle_id()).into(),
            renter: value.renter().to_string(),
            owner: value.owner().to_string(),
            hourly_rate: value.hourly_rate(),
            started_at: value.started_at(),
            ended_at: value.ended_at(),
            status: value.status(),
            duration_minutes: value.duration_minutes(),
            distance_km: value.distance_km(),
            total_cost: value.total_cost(),
            payment_status: value.payment_status(),
            rating: value.rating().map(i16::from),
            review: value.review().map(str::to_string),
        }
    }
}

/// The cycle id arrives as the raw string scanned off the frame sticker,
/// so well-formedness is the protocol's first precondition rather than a
/// parsing concern pushed to the edge.
#[derive(Debug, Clone)]
pub struct AcquireCycleDto {
    pub cycle_id: String,
    pub renter: String,
}

#[derive(Debug, Clone)]
pub struct CompleteRentalDto {
    pub rental_id: Uuid,
    pub renter: String,
    pub rating: Option<i16>,
    pub review: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CancelRentalDto {
    pub rental_id: Uuid,
    pub acting_user: String,
}

#[derive(Debug, Clone)]
pub struct GetRentalDto {
    pub rental_id: Uuid,
    pub acting_user: String,
}

#[derive(Debug, Clone)]
pub struct ListRentalsDto {
    pub renter: String,
}
