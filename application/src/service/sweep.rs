use std::marker::PhantomData;
use std::sync::Mutex;

use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kernel::interface::config::SweepConfig;
use kernel::interface::database::{DatabaseConnection, DependOnDatabaseConnection, Transaction};
use kernel::interface::query::{
    CycleQuery, DependOnCycleQuery, DependOnPaymentQuery, DependOnRentalQuery, PaymentQuery,
    RentalQuery,
};
use kernel::interface::update::{
    CycleModifier, DependOnCycleModifier, DependOnPaymentModifier, DependOnRentalModifier,
    PaymentModifier, RentalModifier,
};
use kernel::prelude::entity::{PaymentStatus, Rental, RentalPaymentStatus, RentalStatus};
use kernel::KernelError;

#[derive(Debug, Default, Clone, Copy)]
pub struct SweepReport {
    pub expired: usize,
    pub repaired: usize,
}

/// One sweep pass: expire unpaid completed rentals past the timeout, then
/// repair cycles whose rented flag has no active ledger entry behind it.
/// Every step is idempotent; running the sweep twice penalizes nobody
/// twice and paid rentals are never touched.
#[async_trait::async_trait]
pub trait TimeoutSweepService<Connection: Transaction>:
    'static
    + Sync
    + Send
    + DependOnDatabaseConnection<Connection>
    + DependOnCycleQuery<Connection>
    + DependOnCycleModifier<Connection>
    + DependOnRentalQuery<Connection>
    + DependOnRentalModifier<Connection>
    + DependOnPaymentQuery<Connection>
    + DependOnPaymentModifier<Connection>
{
    async fn sweep_once(
        &self,
        config: &SweepConfig,
    ) -> error_stack::Result<SweepReport, KernelError> {
        let threshold = OffsetDateTime::now_utc() - config.payment_timeout();

        let mut con = self.database_connection().transact().await?;
        let overdue = self
            .rental_query()
            .find_payment_overdue(&mut con, threshold)
            .await?;
        con.commit().await?;

        let mut expired = 0;
        for rental in overdue {
            // One transaction per rental so a single bad row cannot stall
            // the whole pass.
            match self.expire_one(&rental).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(report) => error!("expiring rental {}: {report:?}", rental.id()),
            }
        }

        let repaired = self.repair_orphaned_cycles().await?;
        Ok(SweepReport { expired, repaired })
    }

    async fn expire_one(&self, rental: &Rental) -> error_stack::Result<bool, KernelError> {
        let now = OffsetDateTime::now_utc();
        let mut con = self.database_connection().transact().await?;
        let result = async {
            // Re-read: another sweep or a late settlement may have won.
            let Some(current) = self.rental_query().find_by_id(&mut con, rental.id()).await?
            else {
                return Ok(false);
            };
            if current.status() != RentalStatus::Completed
                || current.payment_status() != RentalPaymentStatus::Pending
            {
                return Ok(false);
            }

            let failed = current.with_payment_status(RentalPaymentStatus::Failed);
            self.rental_modifier().update(&mut con, &failed).await?;

            for payment in self
                .payment_query()
                .find_by_rental_id(&mut con, failed.id())
                .await?
            {
                if payment.status() == PaymentStatus::Pending {
                    let timed_out = payment.fail(
                        json!({
                            "reason": "payment window expired",
                            "timed_out_at": now.to_string(),
                        }),
                        now,
                    )?;
                    self.payment_modifier().update(&mut con, &timed_out).await?;
                }
            }

            // Defensive cleanup for clients that completed and walked away:
            // free the cycle, but only when nobody else holds it.
            if self
                .rental_query()
                .find_active_by_cycle(&mut con, failed.cycle_id())
                .await?
                .is_none()
            {
                let flagged = self
                    .cycle_query()
                    .find_by_id(&mut con, failed.cycle_id())
                    .await?
                    .is_some_and(|cycle| cycle.is_rented());
                if flagged {
                    self.cycle_modifier()
                        .release(&mut con, failed.cycle_id())
                        .await?;
                }
            }

            info!("expired unpaid rental {}", failed.id());
            Ok(true)
        }
        .await;

        match result {
            Ok(expired) => {
                con.commit().await?;
                Ok(expired)
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed expiry: {rollback:?}");
                }
                Err(report)
            }
        }
    }

    async fn repair_orphaned_cycles(&self) -> error_stack::Result<usize, KernelError> {
        let mut con = self.database_connection().transact().await?;
        let result = async {
            let orphans = self.cycle_query().find_orphaned_rented(&mut con).await?;
            for cycle_id in &orphans {
                self.cycle_modifier().release(&mut con, cycle_id).await?;
                warn!("repaired orphaned rented flag on cycle {cycle_id}");
            }
            Ok(orphans.len())
        }
        .await;

        match result {
            Ok(repaired) => {
                con.commit().await?;
                Ok(repaired)
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed repair: {rollback:?}");
                }
                Err(report)
            }
        }
    }
}

impl<Connection: Transaction, T> TimeoutSweepService<Connection> for T where
    T: DependOnDatabaseConnection<Connection>
        + DependOnCycleQuery<Connection>
        + DependOnCycleModifier<Connection>
        + DependOnRentalQuery<Connection>
        + DependOnRentalModifier<Connection>
        + DependOnPaymentQuery<Connection>
        + DependOnPaymentModifier<Connection>
{
}

/// Owned background component wrapping the sweep in a periodic loop. The
/// first pass runs immediately on start; afterwards the interval paces it.
pub struct TimeoutSweep<M, Connection> {
    module: M,
    config: SweepConfig,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    _connection: PhantomData<fn() -> Connection>,
}

impl<M, Connection> TimeoutSweep<M, Connection>
where
    Connection: Transaction,
    M: TimeoutSweepService<Connection> + Clone,
{
    pub fn new(module: M, config: SweepConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            module,
            config,
            shutdown,
            handle: Mutex::new(None),
            _connection: PhantomData,
        }
    }

    pub fn start(&self) {
        let module = self.module.clone();
        let config = self.config.clone();
        let mut shutdown = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval());
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match module.sweep_once(&config).await {
                            Ok(report) if report.expired > 0 || report.repaired > 0 => {
                                info!(
                                    expired = report.expired,
                                    repaired = report.repaired,
                                    "payment timeout sweep finished",
                                );
                            }
                            Ok(_) => debug!("payment timeout sweep found nothing"),
                            Err(report) => error!("payment timeout sweep failed: {report:?}"),
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        });

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(join) = handle.await {
                error!("sweep task did not shut down cleanly: {join}");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration as StdDuration;

    use rust_decimal::Decimal;
    use time::Duration;
    use uuid::Uuid;

    use kernel::interface::config::SweepConfig;
    use kernel::prelude::entity::{PaymentStatus, RentalPaymentStatus};

    use crate::mock::MockModule;
    use crate::service::{
        AcquireCycleService, ReleaseRentalService, SettlementService, TimeoutSweepService,
    };
    use crate::transfer::{
        AcquireCycleDto, CompleteRentalDto, ConfirmSettlementDto, CreateSessionDto,
    };

    fn fast_config() -> SweepConfig {
        SweepConfig::new(StdDuration::from_secs(300), StdDuration::from_secs(30 * 60))
    }

    async fn overdue_unpaid_rental(module: &MockModule) -> (Uuid, Uuid, String) {
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: "renter".into(),
            })
            .await
            .unwrap();
        module.backdate_rental(rental.id, Duration::minutes(90));
        module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter".into(),
                rating: None,
                review: None,
            })
            .await
            .unwrap();
        let session = module
            .create_session(CreateSessionDto {
                rental_id: rental.id,
                payer: "renter".into(),
                amount: Decimal::new(20, 0),
                customer: Default::default(),
            })
            .await
            .unwrap();
        // The renter walked away 40 minutes ago.
        module.backdate_rental_end(rental.id, Duration::minutes(40));
        (cycle_id, rental.id, session.transaction_id)
    }

    #[tokio::test]
    async fn sweep_expires_overdue_unpaid_rentals() {
        let module = MockModule::new();
        let (cycle_id, rental_id, transaction_id) = overdue_unpaid_rental(&module).await;
        // The abandoned client also never triggered the release.
        module.force_claim_cycle(cycle_id, "renter");

        let report = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(report.expired, 1);

        assert_eq!(
            module.rental_snapshot(rental_id).payment_status(),
            RentalPaymentStatus::Failed
        );
        assert_eq!(
            module.payment_snapshot(&transaction_id).status(),
            PaymentStatus::Failed
        );
        assert!(!module.cycle_snapshot(cycle_id).is_rented());
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let module = MockModule::new();
        overdue_unpaid_rental(&module).await;

        let first = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(first.expired, 1);

        let second = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(second.expired, 0);
        assert_eq!(second.repaired, 0);
    }

    #[tokio::test]
    async fn sweep_never_touches_paid_rentals() {
        let module = MockModule::new();
        let (_, rental_id, transaction_id) = overdue_unpaid_rental(&module).await;
        module
            .confirm(ConfirmSettlementDto {
                transaction_id,
                verification_id: "VAL-1".into(),
            })
            .await
            .unwrap();

        let report = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(report.expired, 0);
        assert_eq!(
            module.rental_snapshot(rental_id).payment_status(),
            RentalPaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn recent_pending_rentals_are_left_alone() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: "renter".into(),
            })
            .await
            .unwrap();
        module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter".into(),
                rating: None,
                review: None,
            })
            .await
            .unwrap();

        let report = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(report.expired, 0);
        assert_eq!(
            module.rental_snapshot(rental.id).payment_status(),
            RentalPaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn repair_resets_orphaned_rented_flags_repeatedly() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        // Manual edit left the flag up with no ledger entry behind it.
        module.force_claim_cycle(cycle_id, "ghost");

        let report = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(report.repaired, 1);
        assert!(!module.cycle_snapshot(cycle_id).is_rented());

        let report = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(report.repaired, 0);
    }

    #[tokio::test]
    async fn repair_leaves_legitimate_rentals_alone() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: "renter".into(),
            })
            .await
            .unwrap();

        let report = module.sweep_once(&fast_config()).await.unwrap();
        assert_eq!(report.repaired, 0);
        assert!(module.cycle_snapshot(cycle_id).is_rented());
    }
}
