use serde::Deserialize;
use uuid::Uuid;

use application::transfer::{
    AcquireCycleDto, CancelRentalDto, CompleteRentalDto, GetRentalDto, ListRentalsDto,
};
use kernel::prelude::entity::UserId;

use crate::controller::Intake;

/// The body carries the scanned id verbatim; the protocol decides whether
/// it is well-formed.
#[derive(Debug, Deserialize)]
pub struct RentCycleRequest {
    cycle_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRentalRequest {
    rating: Option<i16>,
    review: Option<String>,
}

pub struct CancelIntake {
    pub user: UserId,
    pub rental_id: Uuid,
}

pub struct RentalTransformer;

impl Intake<(UserId, RentCycleRequest)> for RentalTransformer {
    type To = AcquireCycleDto;
    fn emit(&self, (user, req): (UserId, RentCycleRequest)) -> Self::To {
        AcquireCycleDto {
            cycle_id: req.cycle_id,
            renter: user.into(),
        }
    }
}

impl Intake<(UserId, Uuid, CompleteRentalRequest)> for RentalTransformer {
    type To = CompleteRentalDto;
    fn emit(&self, (user, rental_id, req): (UserId, Uuid, CompleteRentalRequest)) -> Self::To {
        CompleteRentalDto {
            rental_id,
            renter: user.into(),
            rating: req.rating,
            review: req.review,
        }
    }
}

impl Intake<CancelIntake> for RentalTransformer {
    type To = CancelRentalDto;
    fn emit(&self, input: CancelIntake) -> Self::To {
        CancelRentalDto {
            rental_id: input.rental_id,
            acting_user: input.user.into(),
        }
    }
}

impl Intake<(UserId, Uuid)> for RentalTransformer {
    type To = GetRentalDto;
    fn emit(&self, (user, rental_id): (UserId, Uuid)) -> Self::To {
        GetRentalDto {
            rental_id,
            acting_user: user.into(),
        }
    }
}

impl Intake<UserId> for RentalTransformer {
    type To = ListRentalsDto;
    fn emit(&self, user: UserId) -> Self::To {
        ListRentalsDto {
            renter: user.into(),
        }
    }
}
