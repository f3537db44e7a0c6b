//! txgate-server: HTTP server with request-scoped transaction management.
//!
//! Every mutating route runs inside exactly one read-write transaction on the
//! writer pool; every read route inside one read-only transaction on the
//! reader pool. The transaction is bound before the handler runs, carried
//! through the request's extensions, and resolved (commit or rollback)
//! exactly once when the handler finishes - on success, error, or panic.

pub mod db;
pub mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use txgate_core::AppConfig;

pub use error::ApiError;
pub use state::AppState;

/// Build the application router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::health::router())
        .merge(routes::users::router(&state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Open both pools, run migrations, and serve until shutdown.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let pools = db::DbPools::open(&config.writer, &config.reader).await?;
    db::migrations::run(pools.writer()).await?;

    let state = AppState::new(pools.clone());
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pools live for the whole process; drain them on the way out so
    // in-flight connections close cleanly.
    pools.close().await;
    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
