//! HTTP route handlers for the web interface.
//!
//! Routes are grouped by how long their responses may be cached. Archived
//! emails never change, threads may gain replies, lists gain threads, and
//! the status endpoint is always fresh.

pub mod email;
pub mod health;
pub mod list;
pub mod status;
pub mod thread;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use serde::Deserialize;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{
    CACHE_CONTROL_EMAIL, CACHE_CONTROL_LIST_VIEW, CACHE_CONTROL_NONE, CACHE_CONTROL_STATIC,
    CACHE_CONTROL_THREAD_VIEW,
};
use crate::http::static_files::create_static_service;
use crate::middleware::request_id_layer;
use crate::state::{AppState, RenderOverrides};

/// Query parameters that override the configured rendering mode.
#[derive(Debug, Default, Deserialize)]
pub struct RenderParams {
    pub chatty: Option<bool>,
    pub compact_quotes: Option<bool>,
    /// Client render width in pixels
    pub width: Option<u32>,
}

impl RenderParams {
    pub fn overrides(&self) -> RenderOverrides {
        RenderOverrides {
            chatty: self.chatty,
            compact_quotes: self.compact_quotes,
            width: self.width,
        }
    }
}

/// Creates the Axum router with all routes and cache headers.
pub fn create_router(state: AppState) -> Router {
    // Thread view - short cache, may get new replies
    let thread_routes = Router::new()
        .route("/thread/{id}", get(thread::view))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_THREAD_VIEW),
        ));

    // List overview - shortest page cache, new threads arrive all the time
    let list_routes = Router::new()
        .route("/list", get(list::view))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_LIST_VIEW),
        ));

    // Single emails - longer cache, archived content is immutable
    let email_routes = Router::new()
        .route("/email/{id}", get(email::view))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_EMAIL),
        ));

    // Loading indicator state - never cached
    let status_routes = Router::new()
        .route("/api/status", get(status::status))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_NONE),
        ));

    let static_routes = Router::new()
        .nest_service("/static", create_static_service(&state.config.ui))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_STATIC),
        ));

    // Health check - no caching, always fresh for liveness checks
    let health_routes = Router::new().route("/health", get(health::health));

    Router::new()
        .merge(thread_routes)
        .merge(list_routes)
        .merge(email_routes)
        .merge(status_routes)
        .merge(health_routes)
        .merge(static_routes)
        .with_state(state)
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
