use std::net::SocketAddr;

use error_stack::ResultExt;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use application::service::{MirrorSync, TimeoutSweep};
use driver::database::PostgresTransaction;
use kernel::interface::config::{SweepConfig, SyncConfig};
use kernel::KernelError;

use crate::error::StackTrace;
use crate::handler::AppModule;
use crate::route::{CycleRouter, RentalRouter, SettlementRouter};

mod auth;
mod controller;
mod error;
mod handler;
mod route;

#[tokio::main]
async fn main() -> Result<(), StackTrace> {
    let appender = tracing_appender::rolling::daily(std::path::Path::new("./logs/"), "debug.log");
    let (non_blocking_appender, _guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_filter(tracing_subscriber::EnvFilter::new(
                    std::env::var("RUST_LOG").unwrap_or_else(|_| {
                        "driver=debug,server=debug,application=debug,tower_http=debug,sqlx=info"
                            .into()
                    }),
                ))
                .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG),
        )
        .with(
            tracing_subscriber::fmt::Layer::default()
                .with_writer(non_blocking_appender)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::DEBUG),
        )
        .init();

    let module = AppModule::new().await?;

    // Background components own their loops; requests never wait on them.
    let sweep: TimeoutSweep<AppModule, PostgresTransaction> =
        TimeoutSweep::new(module.clone(), SweepConfig::default());
    sweep.start();
    let sync: MirrorSync<AppModule, PostgresTransaction> =
        MirrorSync::new(module.clone(), SyncConfig::default());
    sync.start();

    let router = axum::Router::new()
        .route_cycle()
        .route_rental()
        .route_settlement()
        .layer(CorsLayer::new())
        .with_state(module);

    let bind = SocketAddr::from(([0, 0, 0, 0], 8080));
    let tcp = TcpListener::bind(bind)
        .await
        .change_context_lazy(|| KernelError::Internal)
        .attach_printable_lazy(|| "Failed to listen tcp")?;

    axum::serve(tcp, router.into_make_service())
        .await
        .change_context_lazy(|| KernelError::Internal)?;

    sync.stop().await;
    sweep.stop().await;

    Ok(())
}
