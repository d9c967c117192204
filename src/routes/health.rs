//! Health check endpoint for container orchestration.

/// Liveness check: returns "ok" whenever the process can answer HTTP.
pub async fn health() -> &'static str {
    "ok"
}
