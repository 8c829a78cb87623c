mod id;
mod method;
mod status;
mod transaction;

pub use self::{id::*, method::*, status::*, transaction::*};

use error_stack::Report;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::entity::{RentalId, UserId};
use crate::KernelError;

/// A settlement attempt against the external gateway. Keyed for lookups by
/// the gateway-visible transaction id, since callbacks never carry our ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    rental_id: RentalId,
    payer: UserId,
    amount: Decimal,
    method: PaymentMethod,
    transaction_id: TransactionId,
    status: PaymentStatus,
    gateway_response: serde_json::Value,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl Payment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PaymentId,
        rental_id: RentalId,
        payer: UserId,
        amount: Decimal,
        method: PaymentMethod,
        transaction_id: TransactionId,
        status: PaymentStatus,
        gateway_response: serde_json::Value,
        created_at: OffsetDateTime,
        updated_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            rental_id,
            payer,
            amount,
            method,
            transaction_id,
            status,
            gateway_response,
            created_at,
            updated_at,
        }
    }

    /// Fresh pending record created when a settlement session opens.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: PaymentId,
        rental_id: RentalId,
        payer: UserId,
        amount: Decimal,
        method: PaymentMethod,
        transaction_id: TransactionId,
        session_payload: serde_json::Value,
        now: OffsetDateTime,
    ) -> Self {
        Self::new(
            id,
            rental_id,
            payer,
            amount,
            method,
            transaction_id,
            PaymentStatus::Pending,
            session_payload,
            now,
            now,
        )
    }

    pub fn id(&self) -> &PaymentId {
        &self.id
    }

    pub fn rental_id(&self) -> &RentalId {
        &self.rental_id
    }

    pub fn payer(&self) -> &UserId {
        &self.payer
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn gateway_response(&self) -> &serde_json::Value {
        &self.gateway_response
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    pub fn complete(
        self,
        verification_payload: serde_json::Value,
        now: OffsetDateTime,
    ) -> error_stack::Result<Self, KernelError> {
        self.transition(PaymentStatus::Completed, verification_payload, now)
    }

    pub fn fail(
        self,
        payload: serde_json::Value,
        now: OffsetDateTime,
    ) -> error_stack::Result<Self, KernelError> {
        self.transition(PaymentStatus::Failed, payload, now)
    }

    pub fn cancel(
        self,
        payload: serde_json::Value,
        now: OffsetDateTime,
    ) -> error_stack::Result<Self, KernelError> {
        self.transition(PaymentStatus::Cancelled, payload, now)
    }

    fn transition(
        mut self,
        to: PaymentStatus,
        payload: serde_json::Value,
        now: OffsetDateTime,
    ) -> error_stack::Result<Self, KernelError> {
        if self.status != PaymentStatus::Pending {
            return Err(Report::new(KernelError::InvalidStateTransition).attach_printable(
                format!("payment {} is {}, wanted {to}", self.transaction_id, self.status),
            ));
        }
        self.status = to;
        self.gateway_response = merge_payload(self.gateway_response, payload);
        self.updated_at = now;
        Ok(self)
    }
}

/// Gateway payloads accumulate over the payment's life: the session
/// response first, then callback and verification fields on top.
fn merge_payload(base: serde_json::Value, patch: serde_json::Value) -> serde_json::Value {
    match (base, patch) {
        (serde_json::Value::Object(mut base), serde_json::Value::Object(patch)) => {
            base.extend(patch);
            serde_json::Value::Object(base)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;
    use serde_json::json;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use crate::entity::{
        Payment, PaymentId, PaymentMethod, PaymentStatus, RentalId, TransactionId, UserId,
    };
    use crate::KernelError;

    fn pending_payment() -> Payment {
        Payment::pending(
            PaymentId::new(Uuid::new_v4()),
            RentalId::new(Uuid::new_v4()),
            UserId::new("payer"),
            Decimal::new(20, 0),
            PaymentMethod::Gateway,
            TransactionId::new("TXN-1"),
            json!({"session_id": "s1"}),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn complete_merges_payload() {
        let payment = pending_payment()
            .complete(json!({"verified": true}), OffsetDateTime::UNIX_EPOCH)
            .expect("pending completes");
        assert_eq!(payment.status(), PaymentStatus::Completed);
        assert_eq!(payment.gateway_response()["session_id"], "s1");
        assert_eq!(payment.gateway_response()["verified"], true);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let payment = pending_payment()
            .fail(json!({}), OffsetDateTime::UNIX_EPOCH)
            .expect("pending fails");
        let err = payment
            .complete(json!({}), OffsetDateTime::UNIX_EPOCH)
            .unwrap_err();
        assert_eq!(
            err.current_context(),
            &KernelError::InvalidStateTransition
        );
    }
}
