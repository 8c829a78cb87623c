use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use application::transfer::CycleDto;

use crate::controller::Exhaust;

#[derive(Debug, Serialize)]
pub struct LocationResponse {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct CycleResponse {
    id: Uuid,
    owner: String,
    brand: String,
    model: String,
    description: Option<String>,
    condition: Option<String>,
    hourly_rate: Decimal,
    is_active: bool,
    is_rented: bool,
    location: Option<LocationResponse>,
    total_rentals: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    last_rented_at: Option<OffsetDateTime>,
}

impl From<CycleDto> for CycleResponse {
    fn from(dto: CycleDto) -> Self {
        Self {
            id: dto.id,
            owner: dto.owner,
            brand: dto.brand,
            model: dto.model,
            description: dto.description,
            condition: dto.condition,
            hourly_rate: dto.hourly_rate,
            is_active: dto.is_active,
            is_rented: dto.is_rented,
            location: dto.location.map(|point| LocationResponse {
                latitude: point.latitude(),
                longitude: point.longitude(),
            }),
            total_rentals: dto.total_rentals,
            last_rented_at: dto.last_rented_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CycleListResponse {
    cycles: Vec<CycleResponse>,
}

pub struct CyclePresenter;

impl Exhaust<CycleDto> for CyclePresenter {
    type To = Json<CycleResponse>;
    fn emit(&self, dto: CycleDto) -> Self::To {
        Json(CycleResponse::from(dto))
    }
}

impl Exhaust<Vec<CycleDto>> for CyclePresenter {
    type To = Json<CycleListResponse>;
    fn emit(&self, dtos: Vec<CycleDto>) -> Self::To {
        Json(CycleListResponse {
            cycles: dtos.into_iter().map(CycleResponse::from).collect(),
        })
    }
}
