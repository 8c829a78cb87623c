use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entity::{RentalId, TransactionId, UserId};
use crate::KernelError;

/// Customer details forwarded to the hosted checkout page. Everything is
/// optional; the gateway wants strings either way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postcode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub rental_id: RentalId,
    pub payer: UserId,
    pub customer: CustomerInfo,
}

/// What the gateway hands back when a checkout session opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Valid,
    Invalid,
}

/// Outcome of re-verifying a transaction against the gateway's validator
/// endpoint. The raw payload is kept for the payment audit trail.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    pub payload: serde_json::Value,
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        self.status == VerificationStatus::Valid
    }
}

/// The external payment gateway. Both calls are network I/O with explicit
/// timeouts; a timeout is reported as `UpstreamTimeout` and is never proof
/// the remote side did not act.
#[async_trait::async_trait]
pub trait PaymentGateway: 'static + Sync + Send {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> error_stack::Result<GatewaySession, KernelError>;

    async fn verify_transaction(
        &self,
        verification_id: &str,
    ) -> error_stack::Result<VerificationResult, KernelError>;
}

pub trait DependOnPaymentGateway: 'static + Sync + Send {
    type PaymentGateway: PaymentGateway;
    fn payment_gateway(&self) -> &Self::PaymentGateway;
}
