use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tourney::{app, AppState, BracketError, BracketGenerator};
use tower::ServiceExt;

use crate::helpers::{build_coordinator, idle_generator, setup_logs, MockBracketService};

fn test_app(pool: SqlitePool, generator: Arc<dyn BracketGenerator>) -> Router {
    let state = AppState {
        coordinator: Arc::new(build_coordinator(pool, generator)),
        cancellation_token: CancellationToken::new(),
    };
    app(state, vec![])
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    actor: Option<&str>,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-actor-id", actor);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    // extractor rejections answer in plain text
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}

async fn create_tournament(app: &Router, max_participants: u32) -> anyhow::Result<String> {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/tournaments",
        None,
        Some(json!({
            "name": "Sunday Cup",
            "game": "free_fire",
            "participation_type": "individual",
            "max_participants": max_participants,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(body["id"].as_str().unwrap_or_default().to_string())
}

async fn register(app: &Router, tournament_id: &str, subject_id: &str) -> anyhow::Result<String> {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/v1/tournaments/{}/registrations", tournament_id),
        None,
        Some(json!({ "subject_id": subject_id })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(body["id"].as_str().unwrap_or_default().to_string())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_health_check(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());

    let (status, _) = send(&app, Method::GET, "/api/v1/health_check", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_create_and_view_tournament(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());

    let tournament_id = create_tournament(&app, 16).await?;
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/tournaments/{}", tournament_id),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "open_for_registration");
    assert_eq!(body["format"], "single_elimination");
    assert_eq!(body["registered_count"], 0);
    assert_eq!(body["remaining_slots"], 16);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/tournaments?status=open_for_registration",
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_invalid_tournament_is_rejected(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/tournaments",
        None,
        Some(json!({
            "name": "   ",
            "game": "valorant",
            "participation_type": "team",
            "max_participants": 8,
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_decision_records_actor(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());

    let tournament_id = create_tournament(&app, 2).await?;
    let registration_id = register(&app, &tournament_id, "ana").await?;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/registrations/{}/decision", registration_id),
        Some("moderator-1"),
        Some(json!({ "status": "accepted" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["decided_by"], "moderator-1");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/v1/tournaments/{}/registrations/subjects/ana",
            tournament_id
        ),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], registration_id.as_str());

    let (status, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/v1/tournaments/{}/registrations/subjects/bo",
            tournament_id
        ),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some_and(|e| e.contains("bo")));
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_patch_clears_details_and_refuses_fixed_fields(
    pool: SqlitePool,
) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());
    let tournament_id = create_tournament(&app, 4).await?;
    let uri = format!("/api/v1/tournaments/{}", tournament_id);

    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        None,
        Some(json!({ "description": "Weekly cup", "rules": "Best of three" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], "Weekly cup");

    let (status, body) = send(
        &app,
        Method::PATCH,
        &uri,
        None,
        Some(json!({ "description": null })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["description"], Value::Null);
    assert_eq!(body["rules"], "Best of three");

    let (status, _) = send(
        &app,
        Method::PATCH,
        &uri,
        None,
        Some(json!({ "max_participants": 64 })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = send(&app, Method::GET, &uri, None, None).await?;
    assert_eq!(body["max_participants"], 4);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_capacity_conflict(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());

    let tournament_id = create_tournament(&app, 2).await?;
    let mut registration_ids = Vec::new();
    for subject in ["ana", "bo", "cy"] {
        registration_ids.push(register(&app, &tournament_id, subject).await?);
    }

    let mut statuses = Vec::new();
    for registration_id in &registration_ids {
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/registrations/{}/decision", registration_id),
            None,
            Some(json!({ "status": "accepted" })),
        )
        .await?;
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::CONFLICT]
    );

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/tournaments/{}/capacity", tournament_id),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["pending"], 1);
    assert_eq!(body["remaining_slots"], 0);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/v1/tournaments/{}/registrations?status=pending",
            tournament_id
        ),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));
    assert_eq!(body[0]["subject_id"], "cy");
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_start_reports_bracket_failure(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let mut generator = MockBracketService::new();
    generator
        .expect_generate_bracket()
        .times(1)
        .returning(|_| Err(BracketError::BadRequest(String::from("not enough players"))));
    let app = test_app(pool, Arc::new(generator));

    let tournament_id = create_tournament(&app, 4).await?;
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/tournaments/{}/start", tournament_id),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("/api/v1/tournaments/{}", tournament_id),
        None,
        None,
    )
    .await?;
    assert_eq!(body["status"], "open_for_registration");
    assert_eq!(body["bracket_id"], Value::Null);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_illegal_transition_conflicts(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());

    let tournament_id = create_tournament(&app, 4).await?;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/tournaments/{}/status", tournament_id),
        None,
        Some(json!({ "target": "finished" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/v1/tournaments/{}/status", tournament_id),
        None,
        Some(json!({ "target": "cancelled" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/tournaments/{}/registrations", tournament_id),
        None,
        Some(json!({ "subject_id": "late" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_unknown_resources_are_not_found(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let app = test_app(pool, idle_generator());
    let missing = uuid::Uuid::now_v7();

    for uri in [
        format!("/api/v1/tournaments/{}", missing),
        format!("/api/v1/tournaments/{}/capacity", missing),
        format!("/api/v1/tournaments/{}/registrations", missing),
        format!("/api/v1/registrations/{}", missing),
    ] {
        let (status, _) = send(&app, Method::GET, &uri, None, None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
    }

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/tournaments/{}", missing),
        None,
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
