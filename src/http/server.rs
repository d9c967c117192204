//! HTTP server startup logic.

use std::net::SocketAddr;

use axum::Router;

use crate::config::HttpServerConfig;

use super::shutdown::shutdown_signal;

/// Server startup error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid http.host or http.port: {0}")]
    Address(#[from] std::net::AddrParseError),

    #[error("Failed to bind server: {0}")]
    Bind(std::io::Error),

    #[error("Server error: {0}")]
    Server(std::io::Error),
}

/// Bind the configured address and serve `app` until a shutdown signal.
pub async fn start_server(app: Router, http: &HttpServerConfig) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", http.host, http.port).parse()?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(ServerError::Bind)?;
    tracing::info!(%addr, "Starting HTTP server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(ServerError::Server)?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address() {
        let http = HttpServerConfig {
            host: "not an address".to_string(),
            port: 8080,
        };
        let err = start_server(Router::new(), &http).await.unwrap_err();
        assert!(matches!(err, ServerError::Address(_)));
    }
}
