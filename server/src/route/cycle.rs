mod request;
mod response;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use uuid::Uuid;

use application::service::GetCycleService;

use crate::auth::Authenticated;
use crate::controller::Controller;
use crate::error::ErrorStatus;
use crate::handler::AppModule;
use crate::route::cycle::request::{CycleTransformer, ListCyclesRequest};
use crate::route::cycle::response::CyclePresenter;

pub trait CycleRouter {
    fn route_cycle(self) -> Self;
}

impl CycleRouter for Router<AppModule> {
    fn route_cycle(self) -> Self {
        self.route(
            "/cycles",
            get(
                |State(module): State<AppModule>,
                 Authenticated(_): Authenticated,
                 Query(req): Query<ListCyclesRequest>| async move {
                    Controller::new(CycleTransformer, CyclePresenter)
                        .intake(req)
                        .handle(|dto| async move { module.list_available(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/cycles/mine",
            get(
                |State(module): State<AppModule>, Authenticated(user): Authenticated| async move {
                    Controller::new(CycleTransformer, CyclePresenter)
                        .intake(user)
                        .handle(|dto| async move { module.list_owned(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
        .route(
            "/cycles/:id",
            get(
                |State(module): State<AppModule>,
                 Authenticated(_): Authenticated,
                 Path(id): Path<Uuid>| async move {
                    Controller::new(CycleTransformer, CyclePresenter)
                        .intake(id)
                        .handle(|dto| async move { module.get_cycle(dto).await })
                        .await
                        .map_err(ErrorStatus::from)
                },
            ),
        )
    }
}
