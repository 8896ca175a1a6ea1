//! Serves compiled routes over TCP.

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::filter::FilterChain;
use crate::route::Routes;
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Router with the configured body limit applied.
pub fn app(config: &ServerConfig, routes: Routes, filters: FilterChain) -> Router {
    routes
        .into_router(filters)
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(config.body_limit_bytes)))
}

pub async fn serve(config: ServerConfig, routes: Routes, filters: FilterChain) -> Result<(), ServeError> {
    let addr = config.socket_addr()?;
    tracing::info!(routes = routes.len(), filters = filters.len(), "mounting");
    let app = app(&config, routes, filters);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
