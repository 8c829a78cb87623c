mod id;
mod rating;
mod status;

pub use self::{id::*, rating::*, status::*};

use error_stack::Report;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::billing::BillingQuote;
use crate::entity::{CycleId, UserId};
use crate::KernelError;

/// A ledger entry. Created only by a successful acquisition, transitioned
/// to completed or cancelled exactly once, immutable afterwards except for
/// payment-status updates and rating attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rental {
    id: RentalId,
    cycle_id: CycleId,
    renter: UserId,
    owner: UserId,
    hourly_rate: Decimal,
    started_at: OffsetDateTime,
    ended_at: Option<OffsetDateTime>,
    status: RentalStatus,
    duration_minutes: Option<i64>,
    distance_km: Option<Decimal>,
    total_cost: Decimal,
    payment_status: RentalPaymentStatus,
    rating: Option<Rating>,
    review: Option<String>,
}

impl Rental {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: RentalId,
        cycle_id: CycleId,
        renter: UserId,
        owner: UserId,
        hourly_rate: Decimal,
        started_at: OffsetDateTime,
        ended_at: Option<OffsetDateTime>,
        status: RentalStatus,
        duration_minutes: Option<i64>,
        distance_km: Option<Decimal>,
        total_cost: Decimal,
        payment_status: RentalPaymentStatus,
        rating: Option<Rating>,
        review: Option<String>,
    ) -> Self {
        Self {
            id,
            cycle_id,
            renter,
            owner,
            hourly_rate,
            started_at,
            ended_at,
            status,
            duration_minutes,
            distance_km,
            total_cost,
            payment_status,
            rating,
            review,
        }
    }

    /// Fresh active entry as the acquisition protocol creates it.
    pub fn start(
        id: RentalId,
        cycle_id: CycleId,
        renter: UserId,
        owner: UserId,
        hourly_rate: Decimal,
        started_at: OffsetDateTime,
    ) -> Self {
        Self::new(
            id,
            cycle_id,
            renter,
            owner,
            hourly_rate,
            started_at,
            None,
            RentalStatus::Active,
            None,
            None,
            Decimal::ZERO,
            RentalPaymentStatus::Pending,
            None,
            None,
        )
    }

    pub fn id(&self) -> &RentalId {
        &self.id
    }

    pub fn cycle_id(&self) -> &CycleId {
        &self.cycle_id
    }

    pub fn renter(&self) -> &UserId {
        &self.renter
    }

    pub fn owner(&self) -> &UserId {
        &self.owner
    }

    pub fn hourly_rate(&self) -> Decimal {
        self.hourly_rate
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        self.ended_at
    }

    pub fn status(&self) -> RentalStatus {
        self.status
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        self.duration_minutes
    }

    pub fn distance_km(&self) -> Option<Decimal> {
        self.distance_km
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn payment_status(&self) -> RentalPaymentStatus {
        self.payment_status
    }

    pub fn rating(&self) -> Option<Rating> {
        self.rating
    }

    pub fn review(&self) -> Option<&str> {
        self.review.as_deref()
    }

    /// Completion transition. Only an active rental may complete.
    pub fn complete(
        mut self,
        ended_at: OffsetDateTime,
        quote: BillingQuote,
        rating: Option<Rating>,
        review: Option<String>,
    ) -> error_stack::Result<Self, KernelError> {
        if self.status != RentalStatus::Active {
            return Err(Report::new(KernelError::InvalidStateTransition)
                .attach_printable(format!("rental {} is {}", self.id, self.status)));
        }
        self.status = RentalStatus::Completed;
        self.ended_at = Some(ended_at);
        self.duration_minutes = Some(quote.duration_minutes());
        self.total_cost = quote.total_cost();
        self.rating = rating;
        self.review = review;
        Ok(self)
    }

    /// Cancellation transition. No billing, cost stays zero.
    pub fn cancel(mut self, ended_at: OffsetDateTime) -> error_stack::Result<Self, KernelError> {
        if self.status != RentalStatus::Active {
            return Err(Report::new(KernelError::InvalidStateTransition)
                .attach_printable(format!("rental {} is {}", self.id, self.status)));
        }
        self.status = RentalStatus::Cancelled;
        self.ended_at = Some(ended_at);
        self.duration_minutes = Some(0);
        self.total_cost = Decimal::ZERO;
        Ok(self)
    }

    pub fn with_payment_status(mut self, payment_status: RentalPaymentStatus) -> Self {
        self.payment_status = payment_status;
        self
    }
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::billing;
    use crate::entity::{CycleId, Rental, RentalId, RentalStatus, UserId};
    use crate::KernelError;

    fn active_rental() -> Rental {
        Rental::start(
            RentalId::new(Uuid::new_v4()),
            CycleId::new(Uuid::new_v4()),
            UserId::new("renter"),
            UserId::new("owner"),
            Decimal::new(10, 0),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn complete_is_single_shot() {
        let ended = OffsetDateTime::UNIX_EPOCH + time::Duration::minutes(90);
        let quote = billing::quote(OffsetDateTime::UNIX_EPOCH, ended, Decimal::new(10, 0));
        let rental = active_rental()
            .complete(ended, quote, None, None)
            .expect("active rental completes");
        assert_eq!(rental.status(), RentalStatus::Completed);
        assert_eq!(rental.total_cost(), Decimal::new(20, 0));

        let quote = billing::quote(OffsetDateTime::UNIX_EPOCH, ended, Decimal::new(10, 0));
        let again = rental.complete(ended, quote, None, None);
        assert_eq!(
            again.unwrap_err().current_context(),
            &KernelError::InvalidStateTransition
        );
    }

    #[test]
    fn cancel_keeps_cost_zero() {
        let rental = active_rental()
            .cancel(OffsetDateTime::UNIX_EPOCH)
            .expect("active rental cancels");
        assert_eq!(rental.status(), RentalStatus::Cancelled);
        assert_eq!(rental.total_cost(), Decimal::ZERO);
    }
}
