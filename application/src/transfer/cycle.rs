use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use kernel::prelude::entity::{Cycle, GeoPoint};

#[derive(Debug, Clone)]
pub struct CycleDto {
    pub id: Uuid,
    pub owner: String,
    pub brand: String,
    pub model: String,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub hourly_rate: Decimal,
    pub is_active: bool,
    pub is_rented: bool,
    pub location: Option<GeoPoint>,
    pub total_rentals: i64,
    pub last_rented_at: Option<OffsetDateTime>,
}

impl From<Cycle> for CycleDto {
    fn from(value: Cycle) -> Self {
        Self {
            id: (*value.id()).into(),
            owner: value.owner().to_string(),
            brand: value.brand().to_string(),
            model: value.model().to_string(),
            description: value.description().map(str::to_string),
            condition: value.condition().map(str::to_string),
            hourly_rate: value.hourly_rate(),
            is_active: value.is_active(),
            is_rented: value.is_rented(),
            location: value.location().copied(),
            total_rentals: value.total_rentals(),
            last_rented_at: value.last_rented_at(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetCycleDto {
    pub cycle_id: Uuid,
}

/// Availability-listing filters as they arrive from the query string.
#[derive(Debug, Clone, Default)]
pub struct ListAvailableCyclesDto {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_km: Option<f64>,
    pub min_hourly_rate: Option<Decimal>,
    pub max_hourly_rate: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ListOwnedCyclesDto {
    pub owner: String,
}
