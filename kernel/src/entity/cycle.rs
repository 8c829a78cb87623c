mod id;

pub use self::id::*;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::{GeoPoint, UserId};

/// A rental unit as the availability store persists it.
///
/// `is_rented` is the contended flag: all mutation of it goes through the
/// store's atomic conditional update, never a read-modify-write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    id: CycleId,
    owner: UserId,
    brand: String,
    model: String,
    description: Option<String>,
    condition: Option<String>,
    hourly_rate: Decimal,
    is_active: bool,
    is_rented: bool,
    current_renter: Option<UserId>,
    location: Option<GeoPoint>,
    total_rentals: i64,
    total_earnings: Decimal,
    last_rented_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl Cycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CycleId,
        owner: UserId,
        brand: String,
        model: String,
        description: Option<String>,
        condition: Option<String>,
        hourly_rate: Decimal,
        is_active: bool,
        is_rented: bool,
        current_renter: Option<UserId>,
        location: Option<GeoPoint>,
        total_rentals: i64,
        total_earnings: Decimal,
        last_rented_at: Option<OffsetDateTime>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            owner,
            brand,
            model,
            description,
            condition,
            hourly_rate,
            is_active,
            is_rented,
            current_renter,
            location,
            total_rentals,
            total_earnings,
            last_rented_at,
            created_at,
        }
    }

    pub fn id(&self) -> &CycleId {
        &self.id
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn brand(&self) -> &str {
        &self.brand
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    pub fn hourly_rate(&self) -> Decimal {
        self.hourly_rate
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_rented(&self) -> bool {
        self.is_rented
    }

    pub fn is_available(&self) -> bool {
        self.is_active && !self.is_rented
    }

    pub fn current_renter(&self) -> Option<&UserId> {
        self.current_renter.as_ref()
    }

    pub fn location(&self) -> Option<&GeoPoint> {
        self.location.as_ref()
    }

    pub fn total_rentals(&self) -> i64 {
        self.total_rentals
    }

    pub fn total_earnings(&self) -> Decimal {
        self.total_earnings
    }

    pub fn last_rented_at(&self) -> Option<OffsetDateTime> {
        self.last_rented_at
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    /// Post-claim image of the row. Drivers apply this state in their own
    /// conditional update; in-memory stores apply it directly.
    pub fn claimed_by(mut self, renter: UserId, at: OffsetDateTime) -> Self {
        self.is_rented = true;
        self.current_renter = Some(renter);
        self.last_rented_at = Some(at);
        self
    }

    /// Post-release image of the row. Unconditional on purpose; release
    /// must stay idempotent.
    pub fn released(mut self) -> Self {
        self.is_rented = false;
        self.current_renter = None;
        self
    }

    pub fn with_completion(mut self, earnings: Decimal) -> Self {
        self.total_rentals += 1;
        self.total_earnings += earnings;
        self
    }
}
