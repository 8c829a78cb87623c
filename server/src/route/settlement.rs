mod request;
mod response;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use tracing::error;
use uuid::Uuid;

use application::service::SettlementService;
use application::transfer::{
    ConfirmSettlementDto, GetSettlementStatusDto, MarkSettlementDto, RetryPaymentDto,
    SettlementOutcome,
};

use crate::auth::Authenticated;
use crate::controller::Controller;
use crate::error::ErrorStatus;
use crate::handler::AppModule;
use crate::route::rental::RentalPresenter;
use crate::route::settlement::request::{
    CreateSessionRequest, GatewayCallbackRequest, SettlementTransformer,
};
use crate::route::settlement::response::{
    GatewayAckResponse, SessionPresenter, SettlementStatusResponse,
};

pub trait SettlementRouter {
    fn route_settlement(self) -> Self;
}

impl SettlementRouter for Router<AppModule> {
    fn route_settlement(self) -> Self {
        self.route(
            "/settlements",
            post(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Json(req): Json<CreateSessionRequest>| async move {
                    Controller::new(SettlementTransformer, SessionPresenter)
                        .intake((user, req))
                        .handle(|dto| async move { module.create_session(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/settlements/success",
            post(
                |State(module): State<AppModule>,
                 Form(req): Form<GatewayCallbackRequest>| async move {
                    let outcome = confirm_absorbing_errors(&module, req).await;
                    Json(GatewayAckResponse::from_outcome(outcome))
                },
            ),
        )
        .route(
            "/settlements/ipn",
            post(
                |State(module): State<AppModule>,
                 Form(req): Form<GatewayCallbackRequest>| async move {
                    let outcome = confirm_absorbing_errors(&module, req).await;
                    Json(GatewayAckResponse::from_outcome(outcome))
                },
            ),
        )
        .route(
            "/settlements/fail",
            post(
                |State(module): State<AppModule>,
                 Form(req): Form<GatewayCallbackRequest>| async move {
                    let dto = MarkSettlementDto {
                        transaction_id: req.tran_id,
                        reason: req.error,
                    };
                    let outcome = match module.mark_failed(dto).await {
                        Ok(outcome) => outcome,
                        Err(report) => {
                            error!("fail callback processing error: {report:?}");
                            SettlementOutcome::Ignored
                        }
                    };
                    Json(GatewayAckResponse::from_outcome(outcome))
                },
            ),
        )
        .route(
            "/settlements/cancel",
            post(
                |State(module): State<AppModule>,
                 Form(req): Form<GatewayCallbackRequest>| async move {
                    let dto = MarkSettlementDto {
                        transaction_id: req.tran_id,
                        reason: req.error,
                    };
                    let outcome = match module.mark_cancelled(dto).await {
                        Ok(outcome) => outcome,
                        Err(report) => {
                            error!("cancel callback processing error: {report:?}");
                            SettlementOutcome::Ignored
                        }
                    };
                    Json(GatewayAckResponse::from_outcome(outcome))
                },
            ),
        )
        .route(
            "/settlements/retry/:rental_id",
            post(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Path(rental_id): Path<Uuid>| async move {
                    Controller::new(SettlementTransformer, RentalPresenter)
                        .intake(RetryPaymentDto {
                            rental_id,
                            acting_user: user.into(),
                        })
                        .handle(|dto| async move { module.retry_payment(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/settlements/:transaction_id",
            get(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Path(transaction_id): Path<String>| async move {
                    let dto = GetSettlementStatusDto {
                        transaction_id: transaction_id.clone(),
                        acting_user: user.into(),
                    };
                    // Status polls are never allowed to error outward; an
                    // unreadable payment reads as still-pending.
                    let response = match module.settlement_status(dto).await {
                        Ok(status) => SettlementStatusResponse::from(status),
                        Err(report) => {
                            error!("settlement status read failed: {report:?}");
                            SettlementStatusResponse::pending(transaction_id)
                        }
                    };
                    Json(response)
                },
            ),
        )
    }
}

/// Callback and IPN share one absorbing wrapper: whatever happens inside,
/// the gateway hears success so its redelivery logic stays calm.
async fn confirm_absorbing_errors(
    module: &AppModule,
    req: GatewayCallbackRequest,
) -> SettlementOutcome {
    let dto = ConfirmSettlementDto {
        transaction_id: req.tran_id,
        verification_id: req.val_id.unwrap_or_default(),
    };
    match module.confirm(dto).await {
        Ok(outcome) => outcome,
        Err(report) => {
            error!("settlement confirmation processing error: {report:?}");
            SettlementOutcome::Ignored
        }
    }
}
