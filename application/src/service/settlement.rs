use error_stack::{Report, ResultExt};
use rust_decimal::Decimal;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use kernel::interface::database::{DatabaseConnection, DependOnDatabaseConnection, Transaction};
use kernel::interface::gateway::{DependOnPaymentGateway, PaymentGateway, SessionRequest};
use kernel::interface::query::{
    DependOnPaymentQuery, DependOnRentalQuery, PaymentQuery, RentalQuery,
};
use kernel::interface::retry;
use kernel::interface::update::{
    DependOnPaymentModifier, DependOnRentalModifier, PaymentModifier, RentalModifier,
};
use kernel::prelude::entity::{
    Payment, PaymentId, PaymentMethod, PaymentStatus, RentalId, RentalPaymentStatus,
    RentalStatus, TransactionId, UserId,
};
use kernel::KernelError;

use crate::transfer::{
    ConfirmSettlementDto, CreateSessionDto, GetSettlementStatusDto, MarkSettlementDto,
    RentalChargeDto, RentalDto, RetryPaymentDto, SettlementOutcome, SettlementSessionDto,
    SettlementStatusDto,
};

/// Largest accepted gap between the rental's computed cost and the amount
/// a client asks to settle.
const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// The settlement state machine. Driven from three directions: session
/// creation by the renter, browser callbacks, and gateway IPNs. Callbacks
/// are attacker-reachable, so a claimed success is never trusted; the
/// validator endpoint decides.
#[async_trait::async_trait]
pub trait SettlementService<Connection: Transaction>:
    'static
    + Sync
    + Send
    + DependOnDatabaseConnection<Connection>
    + DependOnRentalQuery<Connection>
    + DependOnRentalModifier<Connection>
    + DependOnPaymentQuery<Connection>
    + DependOnPaymentModifier<Connection>
    + DependOnPaymentGateway
{
    async fn create_session(
        &self,
        dto: CreateSessionDto,
    ) -> error_stack::Result<SettlementSessionDto, KernelError> {
        let rental_id = RentalId::new(dto.rental_id);
        let payer = UserId::new(dto.payer);

        let mut con = self.database_connection().transact().await?;
        let rental = self
            .rental_query()
            .find_by_id(&mut con, &rental_id)
            .await?
            .ok_or_else(|| {
                Report::new(KernelError::RentalNotFound).attach_printable(rental_id.to_string())
            })?;
        con.commit().await?;

        if rental.renter() != &payer {
            return Err(Report::new(KernelError::Forbidden)
                .attach_printable(format!("{payer} may not pay for {rental_id}")));
        }
        if rental.status() != RentalStatus::Completed {
            return Err(Report::new(KernelError::InvalidStateTransition)
                .attach_printable("only completed rentals can be settled"));
        }
        let gap = (rental.total_cost() - dto.amount).abs();
        if gap > AMOUNT_TOLERANCE {
            // The mismatch is decided here; the gateway is never contacted.
            return Err(Report::new(KernelError::AmountMismatch).attach_printable(format!(
                "expected {} got {}",
                rental.total_cost(),
                dto.amount
            )));
        }

        let transaction_id = TransactionId::new(format!("CYCLEX-{}", Uuid::new_v4().simple()));
        let request = SessionRequest {
            transaction_id: transaction_id.clone(),
            amount: dto.amount,
            rental_id,
            payer: payer.clone(),
            customer: dto.customer,
        };
        let session = retry::bounded(retry::DEFAULT_ATTEMPTS, || {
            self.payment_gateway().create_session(&request)
        })
        .await?;

        let payment = Payment::pending(
            PaymentId::new(Uuid::new_v4()),
            rental_id,
            payer,
            dto.amount,
            PaymentMethod::Gateway,
            transaction_id.clone(),
            json!({
                "session_id": session.session_id,
                "redirect_url": session.redirect_url,
            }),
            OffsetDateTime::now_utc(),
        );

        let mut con = self.database_connection().transact().await?;
        match self.payment_modifier().create(&mut con, &payment).await {
            Ok(()) => con.commit().await?,
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed payment insert: {rollback:?}");
                }
                return Err(report);
            }
        }

        Ok(SettlementSessionDto {
            payment_id: (*payment.id()).into(),
            transaction_id: transaction_id.to_string(),
            session_id: session.session_id,
            redirect_url: session.redirect_url,
            amount: dto.amount,
        })
    }

    /// Shared by the success callback and the IPN. Idempotent by
    /// transaction id: a redelivered notification for a completed payment
    /// is a silent no-op.
    async fn confirm(
        &self,
        dto: ConfirmSettlementDto,
    ) -> error_stack::Result<SettlementOutcome, KernelError> {
        let transaction_id = TransactionId::new(dto.transaction_id);

        let mut con = self.database_connection().transact().await?;
        let payment = self
            .payment_query()
            .find_by_transaction_id(&mut con, &transaction_id)
            .await?;
        con.commit().await?;

        match payment {
            None => {
                warn!("confirmation for unknown transaction {transaction_id}");
                return Ok(SettlementOutcome::Ignored);
            }
            Some(payment) if payment.status() == PaymentStatus::Completed => {
                return Ok(SettlementOutcome::AlreadyCompleted);
            }
            Some(payment) if payment.status().is_terminal() => {
                warn!(
                    "confirmation for {} in terminal state {}",
                    transaction_id,
                    payment.status()
                );
                return Ok(SettlementOutcome::Ignored);
            }
            Some(_) => {}
        }

        // Local state says pending. Ask the gateway what actually
        // happened; the callback's own claim proves nothing.
        let verification = retry::bounded(retry::DEFAULT_ATTEMPTS, || {
            self.payment_gateway().verify_transaction(&dto.verification_id)
        })
        .await
        .attach_printable("verification did not conclude; payment stays pending")?;

        let now = OffsetDateTime::now_utc();
        let mut con = self.database_connection().transact().await?;
        let result = async {
            // Re-read inside the transaction: the callback and the IPN can
            // race each other here.
            let Some(payment) = self
                .payment_query()
                .find_by_transaction_id(&mut con, &transaction_id)
                .await?
            else {
                return Ok(SettlementOutcome::Ignored);
            };
            if payment.status() == PaymentStatus::Completed {
                return Ok(SettlementOutcome::AlreadyCompleted);
            }
            if payment.status().is_terminal() {
                return Ok(SettlementOutcome::Ignored);
            }

            if verification.is_valid() {
                let completed = payment.complete(verification.payload.clone(), now)?;
                self.payment_modifier().update(&mut con, &completed).await?;

                match self
                    .rental_query()
                    .find_by_id(&mut con, completed.rental_id())
                    .await?
                {
                    Some(rental) => {
                        let paid = rental.with_payment_status(RentalPaymentStatus::Paid);
                        self.rental_modifier().update(&mut con, &paid).await?;
                    }
                    None => warn!(
                        "payment {} settled but rental {} is missing",
                        transaction_id,
                        completed.rental_id()
                    ),
                }
                info!("payment {transaction_id} verified and completed");
                Ok(SettlementOutcome::Completed)
            } else {
                let failed = payment.fail(verification.payload.clone(), now)?;
                self.payment_modifier().update(&mut con, &failed).await?;
                warn!("payment {transaction_id} failed gateway verification");
                Ok(SettlementOutcome::VerificationFailed)
            }
        }
        .await;

        match result {
            Ok(outcome) => {
                con.commit().await?;
                Ok(outcome)
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed confirmation: {rollback:?}");
                }
                Err(report)
            }
        }
    }

    async fn mark_failed(
        &self,
        dto: MarkSettlementDto,
    ) -> error_stack::Result<SettlementOutcome, KernelError> {
        self.mark(dto, SettlementOutcome::Failed).await
    }

    async fn mark_cancelled(
        &self,
        dto: MarkSettlementDto,
    ) -> error_stack::Result<SettlementOutcome, KernelError> {
        self.mark(dto, SettlementOutcome::Cancelled).await
    }

    async fn mark(
        &self,
        dto: MarkSettlementDto,
        outcome: SettlementOutcome,
    ) -> error_stack::Result<SettlementOutcome, KernelError> {
        let transaction_id = TransactionId::new(dto.transaction_id);
        let now = OffsetDateTime::now_utc();

        let mut con = self.database_connection().transact().await?;
        let result = async {
            let Some(payment) = self
                .payment_query()
                .find_by_transaction_id(&mut con, &transaction_id)
                .await?
            else {
                warn!("gateway notice for unknown transaction {transaction_id}");
                return Ok(SettlementOutcome::Ignored);
            };
            if payment.status().is_terminal() {
                return Ok(SettlementOutcome::Ignored);
            }

            let payload = json!({
                "reason": dto.reason,
                "reported_at": now.to_string(),
            });
            let updated = match outcome {
                SettlementOutcome::Cancelled => payment.cancel(payload, now)?,
                _ => payment.fail(payload, now)?,
            };
            self.payment_modifier().update(&mut con, &updated).await?;
            Ok(outcome)
        }
        .await;

        match result {
            Ok(outcome) => {
                con.commit().await?;
                Ok(outcome)
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed settlement mark: {rollback:?}");
                }
                Err(report)
            }
        }
    }

    async fn settlement_status(
        &self,
        dto: GetSettlementStatusDto,
    ) -> error_stack::Result<SettlementStatusDto, KernelError> {
        let transaction_id = TransactionId::new(dto.transaction_id.clone());
        let acting = UserId::new(dto.acting_user);

        let mut con = self.database_connection().transact().await?;
        let payment = self
            .payment_query()
            .find_by_transaction_id(&mut con, &transaction_id)
            .await?;

        let Some(payment) = payment.filter(|payment| payment.payer() == &acting) else {
            con.commit().await?;
            return Ok(SettlementStatusDto::pending_shaped(
                dto.transaction_id,
                "Payment is being processed",
            ));
        };

        let charge = self
            .rental_query()
            .find_by_id(&mut con, payment.rental_id())
            .await?
            .map(|rental| RentalChargeDto {
                rental_id: (*rental.id()).into(),
                duration_minutes: rental.duration_minutes(),
                total_cost: rental.total_cost(),
            });
        con.commit().await?;

        Ok(SettlementStatusDto::from_payment(&payment, charge))
    }

    /// Puts a failed settlement back on the runway: the rental becomes
    /// billable-pending again and dead payment rows are dropped.
    async fn retry_payment(
        &self,
        dto: RetryPaymentDto,
    ) -> error_stack::Result<RentalDto, KernelError> {
        let rental_id = RentalId::new(dto.rental_id);
        let acting = UserId::new(dto.acting_user);

        let mut con = self.database_connection().transact().await?;
        let result = async {
            let rental = self
                .rental_query()
                .find_by_id(&mut con, &rental_id)
                .await?
                .ok_or_else(|| {
                    Report::new(KernelError::RentalNotFound)
                        .attach_printable(rental_id.to_string())
                })?;
            if rental.renter() != &acting {
                return Err(Report::new(KernelError::Forbidden)
                    .attach_printable(format!("{acting} may not retry {rental_id}")));
            }
            if rental.payment_status() == RentalPaymentStatus::Paid {
                return Err(Report::new(KernelError::InvalidStateTransition)
                    .attach_printable("rental is already paid"));
            }

            let reset = rental.with_payment_status(RentalPaymentStatus::Pending);
            self.rental_modifier().update(&mut con, &reset).await?;
            self.payment_modifier()
                .delete_failed_by_rental(&mut con, &rental_id)
                .await?;
            Ok(reset)
        }
        .await;

        match result {
            Ok(rental) => {
                con.commit().await?;
                Ok(RentalDto::from(rental))
            }
            Err(report) => {
                if let Err(rollback) = con.roll_back().await {
                    warn!("rollback after failed payment retry: {rollback:?}");
                }
                Err(report)
            }
        }
    }
}

impl<Connection: Transaction, T> SettlementService<Connection> for T where
    T: DependOnDatabaseConnection<Connection>
        + DependOnRentalQuery<Connection>
        + DependOnRentalModifier<Connection>
        + DependOnPaymentQuery<Connection>
        + DependOnPaymentModifier<Connection>
        + DependOnPaymentGateway
{
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;
    use time::Duration;
    use uuid::Uuid;

    use kernel::prelude::entity::{PaymentStatus, RentalPaymentStatus, RentalStatus};
    use kernel::KernelError;

    use crate::mock::MockModule;
    use crate::service::{AcquireCycleService, ReleaseRentalService, SettlementService};
    use crate::transfer::{
        AcquireCycleDto, CompleteRentalDto, ConfirmSettlementDto, CreateSessionDto,
        GetSettlementStatusDto, MarkSettlementDto, RetryPaymentDto, SettlementOutcome,
    };

    async fn completed_rental(module: &MockModule, renter: &str) -> Uuid {
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: renter.to_string(),
            })
            .await
            .unwrap();
        module.backdate_rental(rental.id, Duration::minutes(90));
        module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: renter.to_string(),
                rating: None,
                review: None,
            })
            .await
            .unwrap();
        rental.id
    }

    fn session_dto(rental_id: Uuid, payer: &str, amount: Decimal) -> CreateSessionDto {
        CreateSessionDto {
            rental_id,
            payer: payer.to_string(),
            amount,
            customer: Default::default(),
        }
    }

    #[tokio::test]
    async fn amount_mismatch_never_reaches_the_gateway() {
        let module = MockModule::new();
        let rental_id = completed_rental(&module, "renter").await;

        let err = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(2002, 2)))
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::AmountMismatch);
        assert_eq!(module.gateway_sessions_created(), 0);
    }

    #[tokio::test]
    async fn one_cent_gap_is_tolerated() {
        let module = MockModule::new();
        let rental_id = completed_rental(&module, "renter").await;

        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(2001, 2)))
            .await
            .unwrap();
        assert_eq!(session.amount, Decimal::new(2001, 2));
        assert_eq!(module.gateway_sessions_created(), 1);
    }

    #[tokio::test]
    async fn only_the_renter_may_open_a_session() {
        let module = MockModule::new();
        let rental_id = completed_rental(&module, "renter").await;

        let err = module
            .create_session(session_dto(rental_id, "owner", Decimal::new(20, 0)))
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::Forbidden);
    }

    #[tokio::test]
    async fn active_rentals_cannot_be_settled() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);
        let rental = module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: "renter".into(),
            })
            .await
            .unwrap();

        let err = module
            .create_session(session_dto(rental.id, "renter", Decimal::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::InvalidStateTransition);
    }

    #[tokio::test]
    async fn verified_confirmation_completes_payment_and_marks_rental_paid() {
        let module = MockModule::new();
        let rental_id = completed_rental(&module, "renter").await;
        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(20, 0)))
            .await
            .unwrap();

        let outcome = module
            .confirm(ConfirmSettlementDto {
                transaction_id: session.transaction_id.clone(),
                verification_id: "VAL-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Completed);

        let payment = module.payment_snapshot(&session.transaction_id);
        assert_eq!(payment.status(), PaymentStatus::Completed);
        assert_eq!(
            module.rental_snapshot(rental_id).payment_status(),
            RentalPaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn duplicate_notification_is_a_silent_no_op() {
        let module = MockModule::new();
        let rental_id = completed_rental(&module, "renter").await;
        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(20, 0)))
            .await
            .unwrap();

        let dto = ConfirmSettlementDto {
            transaction_id: session.transaction_id.clone(),
            verification_id: "VAL-1".into(),
        };
        module.confirm(dto.clone()).await.unwrap();
        let verifications_after_first = module.gateway_verifications();

        let outcome = module.confirm(dto).await.unwrap();
        assert_eq!(outcome, SettlementOutcome::AlreadyCompleted);
        // The redelivery never re-verified or re-updated anything.
        assert_eq!(module.gateway_verifications(), verifications_after_first);
        assert_eq!(
            module.rental_snapshot(rental_id).payment_status(),
            RentalPaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn rejected_verification_fails_payment_but_leaves_rental_billable() {
        let module = MockModule::new();
        module.gateway_reject_verifications();
        let rental_id = completed_rental(&module, "renter").await;
        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(20, 0)))
            .await
            .unwrap();

        let outcome = module
            .confirm(ConfirmSettlementDto {
                transaction_id: session.transaction_id.clone(),
                verification_id: "VAL-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::VerificationFailed);
        assert_eq!(
            module.payment_snapshot(&session.transaction_id).status(),
            PaymentStatus::Failed
        );
        // Still billable: retry resets and a second attempt succeeds.
        module.gateway_accept_verifications();
        module
            .retry_payment(RetryPaymentDto {
                rental_id,
                acting_user: "renter".into(),
            })
            .await
            .unwrap();
        assert!(module.payments_for_rental(rental_id).is_empty());

        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(20, 0)))
            .await
            .unwrap();
        let outcome = module
            .confirm(ConfirmSettlementDto {
                transaction_id: session.transaction_id,
                verification_id: "VAL-2".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Completed);
        assert_eq!(
            module.rental_snapshot(rental_id).payment_status(),
            RentalPaymentStatus::Paid
        );
    }

    #[tokio::test]
    async fn unknown_transaction_is_absorbed() {
        let module = MockModule::new();
        let outcome = module
            .confirm(ConfirmSettlementDto {
                transaction_id: "CYCLEX-nope".into(),
                verification_id: "VAL-1".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Ignored);
    }

    #[tokio::test]
    async fn verification_timeout_leaves_payment_pending() {
        let module = MockModule::new();
        module.gateway_time_out_verifications();
        let rental_id = completed_rental(&module, "renter").await;
        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(20, 0)))
            .await
            .unwrap();

        let err = module
            .confirm(ConfirmSettlementDto {
                transaction_id: session.transaction_id.clone(),
                verification_id: "VAL-1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::UpstreamTimeout);
        // Bounded retry exhausted its budget against the gateway.
        assert_eq!(module.gateway_verifications(), 3);
        // A timeout concludes nothing; the payment is still pending.
        assert_eq!(
            module.payment_snapshot(&session.transaction_id).status(),
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn fail_and_cancel_marks_only_touch_pending_payments() {
        let module = MockModule::new();
        let rental_id = completed_rental(&module, "renter").await;
        let session = module
            .create_session(session_dto(rental_id, "renter", Decimal::new(20, 0)))
            .await
            .unwrap();

        let outcome = module
            .mark_cancelled(MarkSettlementDto {
                transaction_id: session.transaction_id.clone(),
                reason: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Cancelled);

        let outcome = module
            .mark_failed(MarkSettlementDto {
                transaction_id: session.transaction_id.clone(),
                reason: Some("late notice".into()),
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Ignored);
        assert_eq!(
            module.payment_snapshot(&session.transaction_id).status(),
            PaymentStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn status_reads_pending_shaped_for_unknown_transactions() {
        let module = MockModule::new();
        let status = module
            .settlement_status(GetSettlementStatusDto {
                transaction_id: "CYCLEX-unknown".into(),
                acting_user: "renter".into(),
            })
            .await
            .unwrap();
        assert_eq!(status.status, PaymentStatus::Pending);
        assert!(status.message.is_some());
    }

    #[tokio::test]
    async fn end_to_end_rental_and_settlement() {
        let module = MockModule::new();
        let cycle_id = module.seed_cycle("owner", Decimal::new(10, 0), true, false);

        // Renter A wins the cycle.
        let rental = module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: "renter-a".into(),
            })
            .await
            .unwrap();

        // Renter B races and loses.
        let err = module
            .acquire(AcquireCycleDto {
                cycle_id: cycle_id.to_string(),
                renter: "renter-b".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.current_context(), &KernelError::CycleUnavailable);

        // Ninety minutes later A returns the cycle.
        module.backdate_rental(rental.id, Duration::minutes(90));
        let completed = module
            .complete(CompleteRentalDto {
                rental_id: rental.id,
                renter: "renter-a".into(),
                rating: None,
                review: None,
            })
            .await
            .unwrap();
        assert_eq!(completed.status, RentalStatus::Completed);
        assert_eq!(completed.total_cost, Decimal::new(20, 0));
        assert!(module.cycle_snapshot(cycle_id).is_available());

        // Settlement for the billed amount goes through verification.
        let session = module
            .create_session(session_dto(rental.id, "renter-a", Decimal::new(20, 0)))
            .await
            .unwrap();
        let outcome = module
            .confirm(ConfirmSettlementDto {
                transaction_id: session.transaction_id.clone(),
                verification_id: "VAL-9".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, SettlementOutcome::Completed);
        assert_eq!(
            module.payment_snapshot(&session.transaction_id).status(),
            PaymentStatus::Completed
        );
        assert_eq!(
            module.rental_snapshot(rental.id).payment_status(),
            RentalPaymentStatus::Paid
        );
    }
}
