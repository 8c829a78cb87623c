use rust_decimal::Decimal;
use uuid::Uuid;

use kernel::interface::gateway::CustomerInfo;
use kernel::prelude::entity::{Payment, PaymentStatus};

#[derive(Debug, Clone)]
pub struct CreateSessionDto {
    pub rental_id: Uuid,
    pub payer: String,
    pub amount: Decimal,
    pub customer: CustomerInfo,
}

#[derive(Debug, Clone)]
pub struct SettlementSessionDto {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub session_id: String,
    pub redirect_url: String,
    pub amount: Decimal,
}

/// Success callback and IPN both carry the gateway's transaction reference
/// plus the validator handle to re-verify with.
#[derive(Debug, Clone)]
pub struct ConfirmSettlementDto {
    pub transaction_id: String,
    pub verification_id: String,
}

#[derive(Debug, Clone)]
pub struct MarkSettlementDto {
    pub transaction_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GetSettlementStatusDto {
    pub transaction_id: String,
    pub acting_user: String,
}

#[derive(Debug, Clone)]
pub struct RetryPaymentDto {
    pub rental_id: Uuid,
    pub acting_user: String,
}

/// How a settlement notification was absorbed. External callers still get
/// a success-shaped response for most of these; the variant drives which
/// page or body is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Verified against the gateway and finalized.
    Completed,
    /// Redelivery of an already-finalized notification; silent no-op.
    AlreadyCompleted,
    /// The gateway's validator rejected the transaction.
    VerificationFailed,
    /// Marked failed on the gateway's say-so (fail callback).
    Failed,
    /// Renter abandoned the hosted checkout.
    Cancelled,
    /// Unknown transaction id or a payment past the point of caring.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RentalChargeDto {
    pub rental_id: Uuid,
    pub duration_minutes: Option<i64>,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone)]
pub struct SettlementStatusDto {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub amount: Option<Decimal>,
    pub rental: Option<RentalChargeDto>,
    pub message: Option<String>,
}

impl SettlementStatusDto {
    /// External pollers must never see an error; an unknown or unreadable
    /// payment reads as still-pending so the client keeps polling.
    pub fn pending_shaped(transaction_id: String, message: impl Into<String>) -> Self {
        Self {
            transaction_id,
            status: PaymentStatus::Pending,
            amount: None,
            rental: None,
            message: Some(message.into()),
        }
    }

    pub fn from_payment(payment: &Payment, rental: Option<RentalChargeDto>) -> Self {
        Self {
            transaction_id: payment.transaction_id().to_string(),
            status: payment.status(),
            amount: Some(payment.amount()),
            rental,
            message: None,
        }
    }
}
