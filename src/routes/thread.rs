//! Handler for the threaded conversation view.

use axum::{
    extract::{Path, Query, State},
    response::Html,
    Extension,
};
use tracing::instrument;

use super::RenderParams;
use crate::error::{AppError, AppErrorResponse, ResultExt};
use crate::middleware::RequestId;
use crate::state::AppState;
use crate::thread::{load_thread, ThreadBuilder};
use crate::view::ThreadView;

/// Render a whole thread, every email fetched and fixed up server side.
#[instrument(
    name = "thread::view",
    skip(state, params, request_id),
    fields(id = %id, emails)
)]
pub async fn view(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Query(params): Query<RenderParams>,
) -> Result<Html<String>, AppErrorResponse> {
    let render = state.render_context(&request_id.0.to_string(), &params.overrides());

    let response = render
        .source
        .fetch_thread(&id)
        .await
        .with_request_id(&request_id)?;
    if response.thread.id.is_empty() {
        return Err(AppErrorResponse {
            error: AppError::ThreadNotFound(id),
            request_id: Some(request_id),
        });
    }

    let tree = ThreadBuilder::new(&render.layout).build(&response.thread);
    tracing::Span::current().record("emails", tree.fetches.len() as u64);
    let loaded = load_thread(render.source.as_ref(), tree, &render.fixup).await;

    // The thread listing may carry the root even when its own fetch failed
    let fallback = response
        .emails
        .iter()
        .find(|email| email.mid == response.thread.id);
    let thread = ThreadView::new(&loaded, fallback, &state.links);

    let mut context = tera::Context::new();
    context.insert("config", &state.config.ui);
    context.insert("mode", &render.fixup.mode);
    context.insert("thread", &thread);

    let html = state
        .tera
        .render("thread.html", &context)
        .map_err(AppError::from)
        .with_request_id(&request_id)?;
    Ok(Html(html))
}
