mod request;
mod response;

pub(crate) use self::response::RentalPresenter;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use application::service::{AcquireCycleService, GetRentalService, ReleaseRentalService};

use crate::auth::Authenticated;
use crate::controller::Controller;
use crate::error::ErrorStatus;
use crate::handler::AppModule;
use crate::route::rental::request::{CompleteRentalRequest, RentCycleRequest, RentalTransformer};

pub trait RentalRouter {
    fn route_rental(self) -> Self;
}

impl RentalRouter for Router<AppModule> {
    fn route_rental(self) -> Self {
        self.route(
            "/rentals",
            get(
                |State(module): State<AppModule>, Authenticated(user): Authenticated| async move {
                    Controller::new(RentalTransformer, RentalPresenter)
                        .intake(user)
                        .handle(|dto| async move { module.list_rentals(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            )
            .post(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Json(req): Json<RentCycleRequest>| async move {
                    Controller::new(RentalTransformer, RentalPresenter)
                        .intake((user, req))
                        .handle(|dto| async move { module.acquire(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/rentals/:id",
            get(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Path(id): Path<Uuid>| async move {
                    Controller::new(RentalTransformer, RentalPresenter)
                        .intake((user, id))
                        .handle(|dto| async move { module.get_rental(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/rentals/:id/complete",
            post(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Path(id): Path<Uuid>,
                 Json(req): Json<CompleteRentalRequest>| async move {
                    Controller::new(RentalTransformer, RentalPresenter)
                        .intake((user, id, req))
                        .handle(|dto| async move { module.complete(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/rentals/:id/cancel",
            post(
                |State(module): State<AppModule>,
                 Authenticated(user): Authenticated,
                 Path(id): Path<Uuid>| async move {
                    Controller::new(RentalTransformer, RentalPresenter)
                        .intake(request::CancelIntake { user, rental_id: id })
                        .handle(|dto| async move { module.cancel(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
    }
}
