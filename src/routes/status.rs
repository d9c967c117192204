//! Backend activity endpoint, polled by the page to drive its loading spinner.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatusResponse {
    /// A backend request has been outstanding past the escrow threshold
    pub loading: bool,
    pub in_flight: usize,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        loading: state.escrow.is_loading(),
        in_flight: state.escrow.in_flight(),
    })
}
