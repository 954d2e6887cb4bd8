use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tourney_core::{
    CapacitySummary, CreateTournament, StatusChange, TournamentStatus, UpdateTournament,
};
use uuid::Uuid;

use super::log_failure;
use crate::{
    domain::{Tournament, TournamentView},
    startup::AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct TournamentFilter {
    #[serde(default)]
    pub status: Option<TournamentStatus>,
}

pub async fn create_tournament(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTournament>,
) -> Result<(StatusCode, Json<Tournament>), ErrorResponse> {
    state
        .coordinator
        .create_tournament(body)
        .await
        .map(|tournament| (StatusCode::CREATED, Json(tournament)))
        .map_err(|e| {
            log_failure("creating tournament", &e);
            e.into()
        })
}

pub async fn list_tournaments(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<TournamentFilter>,
) -> Result<Json<Vec<TournamentView>>, ErrorResponse> {
    state
        .coordinator
        .list_tournaments(filter.status)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("listing tournaments", &e);
            e.into()
        })
}

pub async fn get_tournament(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
) -> Result<Json<TournamentView>, ErrorResponse> {
    state
        .coordinator
        .get_tournament_view(tournament_id)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("getting tournament", &e);
            e.into()
        })
}

pub async fn update_tournament(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
    Json(body): Json<UpdateTournament>,
) -> Result<Json<Tournament>, ErrorResponse> {
    state
        .coordinator
        .update_tournament(tournament_id, body)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("updating tournament", &e);
            e.into()
        })
}

pub async fn delete_tournament(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
) -> Result<StatusCode, ErrorResponse> {
    state
        .coordinator
        .delete_tournament(tournament_id)
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(|e| {
            log_failure("deleting tournament", &e);
            e.into()
        })
}

pub async fn transition_tournament(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
    Json(body): Json<StatusChange>,
) -> Result<Json<Tournament>, ErrorResponse> {
    state
        .coordinator
        .transition(tournament_id, body.target)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("transitioning tournament", &e);
            e.into()
        })
}

/// Closes registration and seeds the bracket
pub async fn start_tournament(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
) -> Result<Json<Tournament>, ErrorResponse> {
    state
        .coordinator
        .promote_to_in_progress(tournament_id)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("starting tournament", &e);
            e.into()
        })
}

pub async fn get_capacity(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
) -> Result<Json<CapacitySummary>, ErrorResponse> {
    state
        .coordinator
        .capacity(tournament_id)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("getting capacity", &e);
            e.into()
        })
}
