use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use application::transfer::{CreateSessionDto, RetryPaymentDto};
use kernel::interface::gateway::CustomerInfo;
use kernel::prelude::entity::UserId;

use crate::controller::Intake;

#[derive(Debug, Default, Deserialize)]
pub struct CustomerRequest {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    city: Option<String>,
    postcode: Option<String>,
}

impl From<CustomerRequest> for CustomerInfo {
    fn from(req: CustomerRequest) -> Self {
        CustomerInfo {
            name: req.name,
            email: req.email,
            phone: req.phone,
            address: req.address,
            city: req.city,
            postcode: req.postcode,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    rental_id: Uuid,
    amount: Decimal,
    #[serde(default)]
    customer: CustomerRequest,
}

/// What the gateway posts back. Everything except the transaction id is
/// optional; the payload is not trusted either way.
#[derive(Debug, Deserialize)]
pub struct GatewayCallbackRequest {
    pub tran_id: String,
    pub val_id: Option<String>,
    pub error: Option<String>,
}

pub struct SettlementTransformer;

impl Intake<(UserId, CreateSessionRequest)> for SettlementTransformer {
    type To = CreateSessionDto;
    fn emit(&self, (user, req): (UserId, CreateSessionRequest)) -> Self::To {
        CreateSessionDto {
            rental_id: req.rental_id,
            payer: user.into(),
            amount: req.amount,
            customer: req.customer.into(),
        }
    }
}

impl Intake<RetryPaymentDto> for SettlementTransformer {
    type To = RetryPaymentDto;
    fn emit(&self, dto: RetryPaymentDto) -> Self::To {
        dto
    }
}
