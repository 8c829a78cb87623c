use error_stack::{Report, ResultExt};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use kernel::interface::database::{DatabaseConnection, DependOnDatabaseConnection, Transaction};
use kernel::interface::query::{
    CycleQuery, DependOnCycleQuery, DependOnRentalQuery, RentalQuery,
};
use kernel::interface::retry;
use kernel::interface::update::{
    CycleModifier, DependOnCycleModifier, DependOnRentalModifier, RentalModifier,
};
use kernel::prelude::billing;
use kernel::prelude::entity::{CycleId, Rating, Rental, RentalId, UserId};
use kernel::KernelError;

use crate::transfer::{
    AcquireCycleDto, CancelRentalDto, CompleteRentalDto, GetRentalDto, ListRentalsDto, RentalDto,
};

/// The acquisition protocol: the one place a cycle moves from available to
/// rented. All mutual exclusion lives in the store's conditional claim;
/// this service sequences the precondition checks around it and keeps the
/// claim and the ledger insert in one transaction.
#[async_trait::async_trait]
pub trait AcquireCycleService<Connection: Transaction>:
    'static
    + Sync
    + Send
    + DependOnDatabaseConnection<Connection>
    + DependOnCycleQuery<Connection>
    + DependOnCycleModifier<Connection>
    + DependOnRentalQuery<Connection>
    + DependOnRentalModifier<Connection>
{
    async fn acquire(&self, dto: AcquireCycleDto) -> error_stack::Result<RentalDto, KernelError> {
        let cycle_id = Uuid::parse_str(&dto.cycle_id)
            .map(CycleId::new)
            .map_err(|error| {
                Report::new(KernelError::InvalidIdentifier)
                    .attach_printable(format!("cycle id {:?}: {error}", dto.cycle_id))
            })?;
        let renter = UserId::new(dto.renter);

        retry::bounded(retry::DEFAULT_ATTEMPTS, || {
            self.try_acquire(&cycle_id, &renter)
        })
        .await
    }

    async fn try_acquire(
        &self,
        cycle_id: &CycleId,
        renter: &UserId,
    ) -> error_stack::Result<RentalDto, KernelError> {
        let mut con = self.database_connection().transact().await?;
        match self.acquire_in(&mut con, cycle_id, renter).await {
            Ok(rental) => {
                con.commit().await?;
                Ok(RentalDto::from(rental))
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed acquisition: {rollback:?}");
                }
                Err(report)
            }
        }
    }

    async fn acquire_in(
        &self,
        con: &mut Connection,
        cycle_id: &CycleId,
        renter: &UserId,
    ) -> error_stack::Result<Rental, KernelError> {
        let cycle = self
            .cycle_query()
            .find_by_id(con, cycle_id)
            .await?
            .ok_or_else(|| {
                Report::new(KernelError::CycleNotFound).attach_printable(cycle_id.to_string())
            })?;

        if !cycle.is_active() {
            return Err(Report::new(KernelError::CycleInactive)
                .attach_printable(cycle_id.to_string()));
        }
        if cycle.is_rented() {
            return Err(Report::new(KernelError::CycleUnavailable)
                .attach_printable(cycle_id.to_string()));
        }
        if cycle.owner() == renter {
            return Err(Report::new(KernelError::SelfRentalForbidden)
                .attach_printable(format!("{renter} owns {cycle_id}")));
        }
        if self
            .rental_query()
            .find_active_by_renter(con, renter)
            .await?
            .is_some()
        {
            return Err(Report::new(KernelError::RentalLimitExceeded)
                .attach_printable(renter.to_string()));
        }

        let now = OffsetDateTime::now_utc();
        let Some(snapshot) = self
            .cycle_modifier()
            .claim(con, cycle_id, renter, now)
            .await?
        else {
            // Lost the race between read and claim. Re-read fresh state so
            // the caller learns the real reason, not a generic failure.
            return Err(match self.cycle_query().find_by_id(con, cycle_id).await? {
                None => Report::new(KernelError::CycleNotFound),
                Some(current) if !current.is_active() => Report::new(KernelError::CycleInactive),
                Some(_) => Report::new(KernelError::CycleUnavailable),
            }
            .attach_printable(format!("{cycle_id} was claimed concurrently")));
        };

        let rental = Rental::start(
            RentalId::new(Uuid::new_v4()),
            *cycle_id,
            renter.clone(),
            snapshot.owner().clone(),
            snapshot.hourly_rate(),
            now,
        );
        self.rental_modifier()
            .create(con, &rental)
            .await
            .attach_printable_lazy(|| format!("ledger insert for {}", rental.id()))?;
        Ok(rental)
    }
}

impl<Connection: Transaction, T> AcquireCycleService<Connection> for T where
    T: DependOnDatabaseConnection<Connection>
        + DependOnCycleQuery<Connection>
        + DependOnCycleModifier<Connection>
        + DependOnRentalQuery<Connection>
        + DependOnRentalModifier<Connection>
{
}

/// Completion and cancellation. Both release the cycle with the idempotent
/// unconditional reset; the availability row may already have been
/// repaired behind our back and that must never fail a release.
#[async_trait::async_trait]
pub trait ReleaseRentalService<Connection: Transaction>:
    'static
    + Sync
    + Send
    + DependOnDatabaseConnection<Connection>
    + DependOnCycleModifier<Connection>
    + DependOnRentalQuery<Connection>
    + DependOnRentalModifier<Connection>
{
    async fn complete(
        &self,
        dto: CompleteRentalDto,
    ) -> error_stack::Result<RentalDto, KernelError> {
        let rating = dto.rating.map(Rating::new).transpose()?;
        let rental_id = RentalId::new(dto.rental_id);
        let renter = UserId::new(dto.renter);

        let mut con = self.database_connection().transact().await?;
        let result = async {
            let rental = self.fetch_rental(&mut con, &rental_id).await?;
            if rental.renter() != &renter {
                return Err(Report::new(KernelError::Forbidden).attach_printable(format!(
                    "{renter} is not the renter of {rental_id}"
                )));
            }

            let ended_at = OffsetDateTime::now_utc();
            let quote = billing::quote(rental.started_at(), ended_at, rental.hourly_rate());
            let completed = rental.complete(ended_at, quote, rating, dto.review)?;

            self.rental_modifier().update(&mut con, &completed).await?;
            self.cycle_modifier()
                .release(&mut con, completed.cycle_id())
                .await?;
            self.cycle_modifier()
                .record_completion(&mut con, completed.cycle_id(), completed.total_cost())
                .await?;
            Ok(completed)
        }
        .await;

        match result {
            Ok(rental) => {
                con.commit().await?;
                Ok(RentalDto::from(rental))
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed completion: {rollback:?}");
                }
                Err(report)
            }
        }
    }

    async fn cancel(&self, dto: CancelRentalDto) -> error_stack::Result<RentalDto, KernelError> {
        let rental_id = RentalId::new(dto.rental_id);
        let acting = UserId::new(dto.acting_user);

        let mut con = self.database_connection().transact().await?;
        let result = async {
            let rental = self.fetch_rental(&mut con, &rental_id).await?;
            if rental.renter() != &acting && rental.owner() != &acting {
                return Err(Report::new(KernelError::Forbidden).attach_printable(format!(
                    "{acting} is neither renter nor owner of {rental_id}"
                )));
            }

            let cancelled = rental.cancel(OffsetDateTime::now_utc())?;
            self.rental_modifier().update(&mut con, &cancelled).await?;
            self.cycle_modifier()
                .release(&mut con, cancelled.cycle_id())
                .await?;
            Ok(cancelled)
        }
        .await;

        match result {
            Ok(rental) => {
                con.commit().await?;
                Ok(RentalDto::from(rental))
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed cancellation: {rollback:?}");
                }
                Err(report)
            }
        }
    }

    async fn fetch_rental(
        &self,
        con: &mut Connection,
        rental_id: &RentalId,
    ) -> error_stack::Result<Rental, KernelError> {
        self.rental_query()
            .find_by_id(con, rental_id)
            .await?
            .ok_or_else(|| {
                Report::new(KernelError::RentalNotFound).attach_printable(rental_id.to_string())
            })
    }
}

impl<Connection: Transaction, T> ReleaseRentalService<Connection> for T where
    T: DependOnDatabaseConnection<Connection>
        + DependOnCycleModifier<Connection>
        + DependOnRentalQuery<Connection>
        + DependOnRentalModifier<Connection>
{
}

#[async_trait::async_trait]
pub trait GetRentalService<Connection: Transaction>:
    'static + Sync + Send + DependOnDatabaseConnection<Connection> + DependOnRentalQuery<Connection>
{
    async fn get_rental(&self, dto: GetRentalDto) -> error_stack::Result<RentalDto, KernelError> {
        let rental_id = RentalId::new(dto.rental_id);
        let acting = UserId::new(dto.acting_user);

        let mut con = self.database_connection().transact().await?;
        let rental = self
            .rental_query()
            .find_by_id(&mut con, &rental_id)
            .await?
            .ok_or_else(|| {
                Report::new(KernelError::RentalNotFound).attach_printable(rental_id.to_string())
            })?;
        con.commit().await?;

        if rental.renter() != &acting && rental.owner() != &acting {
            return Err(Report::new(KernelError::Forbidden)
                .attach_printable(format!("{acting} may not view {rental_id}")));
        }
        Ok(RentalDto::from(rental))
    }

    async fn list_rentals(
        &self,
        dto: ListRentalsDto,
    ) -> error_stack::Result<Vec<RentalDto>, KernelError> {
        let renter = UserId::new(dto.renter);
        let mut con = self.database_connection().transact().await?;
        let rentals = self.rental_query().find_by_renter(&mut con, &renter).await?;
        con.commit().await?;
        Ok(rentals.into_iter().map(RentalDto::from).collect())
    }
}

impl<Connection: Transaction, T> GetRentalService<Connection> for T where
    T: DependOnDatabaseConnection<Connection> + DependOnRentalQuery<Connection>
{
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;
    use time::Duration;
    use uuid::Uuid;

    use kernel::prelude::entity::{RentalPaymentStatus, RentalStatus};
    use kernel::KernelError;

    use crate::mock::MockModule;
    use crate::service::{AcquireCycleService, GetRentalService, ReleaseRentalService};
    use crate::transfer::{
        AcquireCycleDto, CancelRentalDto, CompleteRentalDto, GetRentalDto,
    };

    fn acquire_dto(cycle_id: Uuid, renter: &str) -> AcquireCycleDto {
        AcquireCycleDto {
            cycle_id: cycle_id.to_string(),
            renter: renter.to_string(),
        }
    }

    #[tokio::test]
    async fn acquire_creates_active_rental_and_claims_cycle() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);

        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();
        assert_eq!(rental.status, RentalStatus::Active);
        assert_eq!(rental.cycle_id, cycle_id);
        assert_eq!(rental.payment_status, RentalPaymentStatus::Pending);

        let cycle = module.cycle_snapshot(cycle_id);
        assert!(cycle.is_rented());
        assert_eq!(cycle.current_renter().map(ToString::to_string), Some("renter".into()));
    }

    #[tokio::test]
    async fn malformed_identifier_is_rejected_first() {
        let module = MockModule::new();
        let err = module
            .acquire(AcquireCycleDto {
                cycle_id: "not-a-uuid".into(),
                renter: "renter".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::InvalidIdentifier);
    }

    #[tokio::test]
    async fn missing_cycle_reports_not_found() {
        let module = MockModule::new();
        let err = module
            .acquire(acquire_dto(Uuid::new_v4(), "renter"))
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::CycleNotFound);
    }

    #[tokio::test]
    async fn inactive_and_rented_are_distinguished() {
        let module = MockModule::new();
        let inactive = module.seed_cycle("owner", Decimal::new(10, 0), false, false);
        let rented = module.seed_cycle("owner", Decimal::new(10, 0), true, true);

        let err = module.acquire(acquire_dto(inactive, "renter")).await.unwrap_err();
        assert_eq!(err.current_context(), &KernelError::CycleInactive);

        let err = module.acquire(acquire_dto(rented, "renter")).await.unwrap_err();
        assert_eq!(err.current_context(), &KernelError::CycleUnavailable);
    }

    #[tokio::test]
    async fn owner_cannot_rent_own_cycle() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let err = module.acquire(acquire_dto(cycle_id, "owner")).await.unwrap_err();
        assert_eq!(err.current_context(), &KernelError::SelfRentalForbidden);
    }

    #[tokio::test]
    async fn second_active_rental_is_rejected() {
        let module = MockModule::new();
        let first = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let second = module.seed_cycle("owner", Decimal::new(10, 0), true, false);

        module.acquire(acquire_dto(first, "renter")).await.unwrap();
        let err = module.acquire(acquire_dto(second, "renter")).await.unwrap_err();
        assert_eq!(err.current_context(), &KernelError::RentalLimitExceeded);
    }

    #[tokio::test]
    async fn concurrent_acquires_yield_exactly_one_winner() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);

        let mut handles = Vec::new();
        for n in 0..8 {
            let module = module.clone();
            handles.push(tokio::spawn(async move {
                module.acquire(acquire_dto(cycle_id, &format!("renter-{n}"))).await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(report) => {
                    assert_eq!(report.current_context(), &KernelError::CycleUnavailable);
                    losers += 1;
                }
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(losers, 7);
    }

    #[tokio::test]
    async fn complete_bills_ninety_minutes_as_two_hours() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();
        module.backdate_rental(rental.id, Duration::minutes(90));

        let completed = module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter".into(),
                rating: Some(5),
                review: Some("smooth ride".into()),
            })
            .await
            .unwrap();

        assert_eq!(completed.status, RentalStatus::Completed);
        assert_eq!(completed.total_cost, Decimal::new(20, 0));
        assert_eq!(completed.rating, Some(5));
        assert!(!module.cycle_snapshot(cycle_id).is_rented());
        assert_eq!(module.cycle_snapshot(cycle_id).total_rentals(), 1);
    }

    #[tokio::test]
    async fn complete_requires_the_renter() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();

        let err = module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "someone-else".into(),
                rating: None,
                review: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::Forbidden);
    }

    #[tokio::test]
    async fn completed_rental_cannot_transition_again() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();

        module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter".into(),
                rating: None,
                review: None,
            })
            .await
            .unwrap();

        let err = module
            .cancel(CancelRentalDto {
                rental_id: rental.id,
                acting_user: "renter".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::InvalidStateTransition);
    }

    #[tokio::test]
    async fn owner_may_cancel_and_no_cost_accrues() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();

        let cancelled = module
            .cancel(CancelRentalDto {
                rental_id: rental.id,
                acting_user: "owner".into(),
            })
            .await
            .unwrap();
        assert_eq!(cancelled.status, RentalStatus::Cancelled);
        assert_eq!(cancelled.total_cost, Decimal::ZERO);
        assert!(!module.cycle_snapshot(cycle_id).is_rented());
    }

    #[tokio::test]
    async fn release_survives_an_already_released_cycle() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();

        // Repair tooling got there first.
        module.force_release_cycle(cycle_id);

        let completed = module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter".into(),
                rating: None,
                review: None,
            })
            .await
            .unwrap();
        assert_eq!(completed.status, RentalStatus::Completed);
        assert!(!module.cycle_snapshot(cycle_id).is_rented());
    }

    #[tokio::test]
    async fn rental_visibility_is_limited_to_parties() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();

        for user in ["renter", "owner"] {
            module
                .get_rental(GetRentalDto {
                    rental_id: rental.id,
                    acting_user: user.into(),
                })
                .await
                .unwrap();
        }

        let err = module
            .get_rental(GetRentalDto {
                rental_id: rental.id,
                acting_user: "stranger".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::Forbidden);
    }

    #[tokio::test]
    async fn invalid_rating_is_rejected_before_any_write() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module.acquire(acquire_dto(cycle_id, "renter")).await.unwrap();

        let err = module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter".into(),
                rating: Some(9),
                review: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::InvalidRating);
        assert_eq!(module.rental_snapshot(rental.id).status(), RentalStatus::Active);
    }
}
