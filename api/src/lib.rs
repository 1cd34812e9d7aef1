//! HTTP surface of the advertising cache: entity CRUD per resource plus a
//! performance view that decorates listed entities with delivery totals.

pub mod aggregator;
pub mod config;
pub mod errors;
pub mod metrics_defs;
pub mod performance;
pub mod routes;

use config::Listener;
use routes::{AppState, router};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(listener: &Listener, state: AppState) -> Result<(), ServeError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let tcp_listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "api listening");

    axum::serve(tcp_listener, router(state)).await?;
    Ok(())
}
