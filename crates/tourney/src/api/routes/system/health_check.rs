use axum::{extract::State, response::ErrorResponse};
use hyper::StatusCode;
use log::{debug, error};
use std::sync::Arc;

use crate::startup::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<StatusCode, ErrorResponse> {
    state.coordinator.ping().await.map_err(|e| {
        error!("{}", e);
        e
    })?;

    debug!("service and db are up");
    Ok(StatusCode::OK)
}
