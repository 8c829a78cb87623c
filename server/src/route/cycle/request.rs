use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use application::transfer::{GetCycleDto, ListAvailableCyclesDto, ListOwnedCyclesDto};
use kernel::prelude::entity::UserId;

use crate::controller::Intake;

#[derive(Debug, Deserialize)]
pub struct ListCyclesRequest {
    lat: Option<f64>,
    lng: Option<f64>,
    radius: Option<f64>,
    price_min: Option<Decimal>,
    price_max: Option<Decimal>,
}

pub struct CycleTransformer;

impl Intake<ListCyclesRequest> for CycleTransformer {
    type To = ListAvailableCyclesDto;
    fn emit(&self, req: ListCyclesRequest) -> Self::To {
        ListAvailableCyclesDto {
            latitude: req.lat,
            longitude: req.lng,
            radius_km: req.radius,
            min_hourly_rate: req.price_min,
            max_hourly_rate: req.price_max,
        }
    }
}

impl Intake<Uuid> for CycleTransformer {
    type To = GetCycleDto;
    fn emit(&self, id: Uuid) -> Self::To {
        GetCycleDto { cycle_id: id }
    }
}

impl Intake<UserId> for CycleTransformer {
    type To = ListOwnedCyclesDto;
    fn emit(&self, owner: UserId) -> Self::To {
        ListOwnedCyclesDto {
            owner: owner.into(),
        }
    }
}
