//! Handler for a single email, outside of its thread.

use axum::{
    extract::{Path, Query, State},
    response::Html,
    Extension,
};
use tracing::instrument;

use super::RenderParams;
use crate::error::{AppError, AppErrorResponse, ResultExt};
use crate::fixup::fixup_body;
use crate::middleware::RequestId;
use crate::state::AppState;
use crate::view::EmailView;

#[instrument(name = "email::view", skip(state, params, request_id), fields(id = %id))]
pub async fn view(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    Query(params): Query<RenderParams>,
) -> Result<Html<String>, AppErrorResponse> {
    let render = state.render_context(&request_id.0.to_string(), &params.overrides());

    let record = render
        .source
        .fetch_email(&id)
        .await
        .with_request_id(&request_id)?;
    if record.mid.is_empty() {
        return Err(AppErrorResponse {
            error: AppError::EmailNotFound(id),
            request_id: Some(request_id),
        });
    }

    let segments = fixup_body(&record.body, &render.fixup);
    let email = EmailView::new(&record, &segments, &state.links);

    let mut context = tera::Context::new();
    context.insert("config", &state.config.ui);
    context.insert("mode", &render.fixup.mode);
    context.insert("email", &email);

    let html = state
        .tera
        .render("email.html", &context)
        .map_err(AppError::from)
        .with_request_id(&request_id)?;
    Ok(Html(html))
}
