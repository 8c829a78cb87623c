use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use application::transfer::{SettlementOutcome, SettlementSessionDto, SettlementStatusDto};

use crate::controller::Exhaust;

#[derive(Debug, Serialize)]
pub struct SettlementSessionResponse {
    payment_id: Uuid,
    transaction_id: String,
    session_id: String,
    redirect_url: String,
    amount: Decimal,
}

pub struct SessionPresenter;

impl Exhaust<SettlementSessionDto> for SessionPresenter {
    type To = Json<SettlementSessionResponse>;
    fn emit(&self, dto: SettlementSessionDto) -> Self::To {
        Json(SettlementSessionResponse {
            payment_id: dto.payment_id,
            transaction_id: dto.transaction_id,
            session_id: dto.session_id,
            redirect_url: dto.redirect_url,
            amount: dto.amount,
        })
    }
}

/// Success-shaped by construction. The gateway's retry behavior on error
/// responses is unpredictable, so it always hears "success".
#[derive(Debug, Serialize)]
pub struct GatewayAckResponse {
    status: &'static str,
    message: &'static str,
}

impl GatewayAckResponse {
    pub fn from_outcome(outcome: SettlementOutcome) -> Self {
        let message = match outcome {
            SettlementOutcome::Completed => "payment verified and completed",
            SettlementOutcome::AlreadyCompleted => "payment already completed",
            SettlementOutcome::VerificationFailed => "payment could not be verified",
            SettlementOutcome::Failed => "payment marked as failed",
            SettlementOutcome::Cancelled => "payment cancelled",
            SettlementOutcome::Ignored => "notification processed",
        };
        Self {
            status: "success",
            message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettlementChargeResponse {
    rental_id: Uuid,
    duration_minutes: Option<i64>,
    total_cost: Decimal,
}

#[derive(Debug, Serialize)]
pub struct SettlementStatusResponse {
    transaction_id: String,
    status: String,
    amount: Option<Decimal>,
    rental: Option<SettlementChargeResponse>,
    message: Option<String>,
}

impl SettlementStatusResponse {
    pub fn pending(transaction_id: String) -> Self {
        Self {
            transaction_id,
            status: "pending".into(),
            amount: None,
            rental: None,
            message: Some("Payment status check failed, retrying".into()),
        }
    }
}

impl From<SettlementStatusDto> for SettlementStatusResponse {
    fn from(dto: SettlementStatusDto) -> Self {
        Self {
            transaction_id: dto.transaction_id,
            status: dto.status.as_str().to_string(),
            amount: dto.amount,
            rental: dto.rental.map(|charge| SettlementChargeResponse {
                rental_id: charge.rental_id,
                duration_minutes: charge.duration_minutes,
                total_cost: charge.total_cost,
            }),
            message: dto.message,
        }
    }
}
