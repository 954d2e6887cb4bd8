use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::ErrorResponse,
    Json,
};
use futures::TryStreamExt;
use std::sync::Arc;
use tourney_core::{Decision, RegistrationQuery, SubmitRegistration};
use uuid::Uuid;

use super::log_failure;
use crate::{
    api::extractors::ActorId,
    domain::{Error, Registration},
    startup::AppState,
};

pub async fn submit_registration(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
    Json(body): Json<SubmitRegistration>,
) -> Result<(StatusCode, Json<Registration>), ErrorResponse> {
    state
        .coordinator
        .submit_registration(tournament_id, &body.subject_id)
        .await
        .map(|registration| (StatusCode::CREATED, Json(registration)))
        .map_err(|e| {
            log_failure("submitting registration", &e);
            e.into()
        })
}

/// `?status=pending&sort=decided_at&order=desc`, insertion order by default
pub async fn list_registrations(
    State(state): State<Arc<AppState>>,
    Path(tournament_id): Path<Uuid>,
    Query(query): Query<RegistrationQuery>,
) -> Result<Json<Vec<Registration>>, ErrorResponse> {
    let listing = async {
        state
            .coordinator
            .list_registrations(tournament_id, query)
            .await?
            .try_collect::<Vec<_>>()
            .await
    };

    listing.await.map(Json).map_err(|e| {
        log_failure("listing registrations", &e);
        e.into()
    })
}

/// Current pending or accepted registration of a user or team
pub async fn get_subject_registration(
    State(state): State<Arc<AppState>>,
    Path((tournament_id, subject_id)): Path<(Uuid, String)>,
) -> Result<Json<Registration>, ErrorResponse> {
    state
        .coordinator
        .find_active_registration(tournament_id, &subject_id)
        .await
        .and_then(|registration| {
            registration.ok_or_else(|| {
                Error::NotFound(format!(
                    "no active registration for {} in tournament {}",
                    subject_id, tournament_id
                ))
            })
        })
        .map(Json)
        .map_err(|e| {
            log_failure("finding subject registration", &e);
            e.into()
        })
}

pub async fn get_registration(
    State(state): State<Arc<AppState>>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<Registration>, ErrorResponse> {
    state
        .coordinator
        .get_registration(registration_id)
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("getting registration", &e);
            e.into()
        })
}

pub async fn decide_registration(
    actor: ActorId,
    State(state): State<Arc<AppState>>,
    Path(registration_id): Path<Uuid>,
    Json(body): Json<Decision>,
) -> Result<Json<Registration>, ErrorResponse> {
    state
        .coordinator
        .decide_registration(registration_id, body.status, actor.into_inner())
        .await
        .map(Json)
        .map_err(|e| {
            log_failure("deciding registration", &e);
            e.into()
        })
}
