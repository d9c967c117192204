//! Handler for the threaded list overview.

use axum::{
    extract::{Query, State},
    response::Html,
    Extension,
};
use serde::Deserialize;
use tracing::instrument;

use crate::api::ListQuery;
use crate::error::{AppError, AppErrorResponse, ResultExt};
use crate::middleware::RequestId;
use crate::state::{AppState, RenderOverrides};
use crate::thread::summarize;
use crate::view::ListView;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// List address, e.g. `dev@example.org`
    #[serde(default)]
    pub list: String,
    /// Archive month as `YYYY-M`
    pub d: Option<String>,
    pub chatty: Option<bool>,
}

/// Render every thread of a list, newest first.
#[instrument(
    name = "list::view",
    skip(state, params, request_id),
    fields(list = %params.list, threads)
)]
pub async fn view(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<ListParams>,
) -> Result<Html<String>, AppErrorResponse> {
    let Some(query) = ListQuery::parse(&params.list, params.d.as_deref()) else {
        return Err(AppErrorResponse {
            error: AppError::InvalidList(params.list),
            request_id: Some(request_id),
        });
    };

    let overrides = RenderOverrides {
        chatty: params.chatty,
        ..RenderOverrides::default()
    };
    let render = state.render_context(&request_id.0.to_string(), &overrides);

    let response = render
        .source
        .fetch_list(&query)
        .await
        .with_request_id(&request_id)?;
    let summaries = summarize(&response);
    tracing::Span::current().record("threads", summaries.len() as u64);
    let list = ListView::new(&query, &summaries);

    let mut context = tera::Context::new();
    context.insert("config", &state.config.ui);
    context.insert("mode", &render.fixup.mode);
    context.insert("list", &list);

    let html = state
        .tera
        .render("list.html", &context)
        .map_err(AppError::from)
        .with_request_id(&request_id)?;
    Ok(Html(html))
}
