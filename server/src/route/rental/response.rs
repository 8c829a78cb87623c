use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use application::transfer::RentalDto;
use kernel::prelude::entity::{RentalPaymentStatus, RentalStatus};

use crate::controller::Exhaust;

#[derive(Debug, Serialize)]
pub struct RentalResponse {
    id: Uuid,
    cycle_id: Uuid,
    renter: String,
    owner: String,
    hourly_rate: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    ended_at: Option<OffsetDateTime>,
    status: RentalStatus,
    duration_minutes: Option<i64>,
    distance_km: Option<Decimal>,
    total_cost: Decimal,
    payment_status: RentalPaymentStatus,
    rating: Option<i16>,
    review: Option<String>,
}

impl From<RentalDto> for RentalResponse {
    fn from(dto: RentalDto) -> Self {
        Self {
            id: dto.id,
            cycle_id: dto.cycle_id,
            renter: dto.renter,
            owner: dto.owner,
            hourly_rate: dto.hourly_rate,
            started_at: dto.started_at,
            ended_at: dto.ended_at,
            status: dto.status,
            duration_minutes: dto.duration_minutes,
            distance_km: dto.distance_km,
            total_cost: dto.total_cost,
            payment_status: dto.payment_status,
            rating: dto.rating,
            review: dto.review,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RentalListResponse {
    rentals: Vec<RentalResponse>,
}

pub struct RentalPresenter;

impl Exhaust<RentalDto> for RentalPresenter {
    type To = Json<RentalResponse>;
    fn emit(&self, dto: RentalDto) -> Self::To {
        Json(RentalResponse::from(dto))
    }
}

impl Exhaust<Vec<RentalDto>> for RentalPresenter {
    type To = Json<RentalListResponse>;
    fn emit(&self, dtos: Vec<RentalDto>) -> Self::To {
        Json(RentalListResponse {
            rentals: dtos.into_iter().map(RentalResponse::from).collect(),
        })
    }
}
