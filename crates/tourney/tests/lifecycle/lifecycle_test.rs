use futures::{future::join_all, TryStreamExt};
use mockall::Sequence;
use sqlx::SqlitePool;
use std::sync::Arc;
use tourney::{BracketError, TournamentError};
use tourney_core::{
    ParticipationType, RegistrationQuery, RegistrationStatus, SignalKind, SignalOutcome,
    SubjectKind, TournamentStatus, UpdateTournament,
};

use crate::helpers::{
    build_coordinator, create_request, generated_bracket, idle_generator, setup_logs,
    MockBracketService,
};

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_team_registration_is_accepted(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let coordinator = build_coordinator(pool, idle_generator());

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Team, 8))
        .await?;
    let registration = coordinator
        .submit_registration(tournament.id, "team-phoenix")
        .await?;
    assert_eq!(registration.subject_kind, SubjectKind::Team);
    assert_eq!(registration.status, RegistrationStatus::Pending);

    let accepted = coordinator
        .decide_registration(
            registration.id,
            RegistrationStatus::Accepted,
            Some(String::from("moderator-7")),
        )
        .await?;
    assert_eq!(accepted.status, RegistrationStatus::Accepted);
    assert_eq!(accepted.decided_by.as_deref(), Some("moderator-7"));
    assert!(accepted.decided_at.is_some());

    let view = coordinator.get_tournament_view(tournament.id).await?;
    assert_eq!(view.registered_count, 1);
    assert_eq!(view.remaining_slots, 7);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_full_tournament_rejects_extra_acceptance(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let coordinator = build_coordinator(pool, idle_generator());

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 2))
        .await?;
    let mut registrations = Vec::new();
    for subject in ["ana", "bo", "cy"] {
        registrations.push(coordinator.submit_registration(tournament.id, subject).await?);
    }

    for registration in &registrations[..2] {
        coordinator
            .decide_registration(registration.id, RegistrationStatus::Accepted, None)
            .await?;
    }

    let overflow = coordinator
        .decide_registration(registrations[2].id, RegistrationStatus::Accepted, None)
        .await;
    assert!(matches!(
        overflow,
        Err(TournamentError::CapacityExceeded {
            max_participants: 2,
            ..
        })
    ));

    let third = coordinator.get_registration(registrations[2].id).await?;
    assert_eq!(third.status, RegistrationStatus::Pending);

    let capacity = coordinator.capacity(tournament.id).await?;
    assert_eq!(capacity.accepted, 2);
    assert_eq!(capacity.pending, 1);
    assert_eq!(capacity.remaining_slots, 0);

    // rejecting an accepted participant frees the slot
    coordinator
        .decide_registration(registrations[0].id, RegistrationStatus::Rejected, None)
        .await?;
    assert_eq!(coordinator.capacity(tournament.id).await?.remaining_slots, 1);

    let third = coordinator
        .decide_registration(registrations[2].id, RegistrationStatus::Accepted, None)
        .await?;
    assert_eq!(third.status, RegistrationStatus::Accepted);
    assert_eq!(coordinator.capacity(tournament.id).await?.remaining_slots, 0);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_failed_promotion_leaves_tournament_open(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let mut generator = MockBracketService::new();
    let mut seq = Sequence::new();
    generator
        .expect_generate_bracket()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(BracketError::Transient(String::from("bracket service down"))));
    generator
        .expect_generate_bracket()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|request| Ok(generated_bracket(&request)));
    let coordinator = build_coordinator(pool, Arc::new(generator));
    let mut signals = coordinator.signals().subscribe();

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 4))
        .await?;
    for subject in ["ana", "bo"] {
        let registration = coordinator.submit_registration(tournament.id, subject).await?;
        coordinator
            .decide_registration(registration.id, RegistrationStatus::Accepted, None)
            .await?;
    }

    let failed = coordinator.promote_to_in_progress(tournament.id).await;
    assert!(matches!(
        failed,
        Err(TournamentError::BracketGenerationFailed(_))
    ));
    let unchanged = coordinator.get_tournament(tournament.id).await?;
    assert_eq!(unchanged.status, TournamentStatus::OpenForRegistration);
    assert_eq!(unchanged.bracket_id, None);
    assert_eq!(unchanged.participants, None);
    assert_eq!(unchanged.started_at, None);

    let failure = signals.try_recv()?;
    assert_eq!(failure.kind, SignalKind::Started);
    assert_eq!(failure.outcome, SignalOutcome::Failure);

    let started = coordinator.promote_to_in_progress(tournament.id).await?;
    assert_eq!(started.status, TournamentStatus::InProgress);
    assert!(started.bracket_id.is_some());
    assert!(started.started_at.is_some());

    let success = signals.try_recv()?;
    assert_eq!(success.outcome, SignalOutcome::Success);
    assert_eq!(success.tournament_id, tournament.id);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_in_progress_tournament_cannot_be_reopened(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let mut generator = MockBracketService::new();
    generator
        .expect_generate_bracket()
        .times(1)
        .returning(|request| Ok(generated_bracket(&request)));
    let coordinator = build_coordinator(pool, Arc::new(generator));

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 4))
        .await?;
    coordinator.promote_to_in_progress(tournament.id).await?;

    let reopened = coordinator
        .transition(tournament.id, TournamentStatus::OpenForRegistration)
        .await;
    assert!(matches!(
        reopened,
        Err(TournamentError::IllegalTransition { .. })
    ));

    let promoted_again = coordinator.promote_to_in_progress(tournament.id).await;
    assert!(matches!(
        promoted_again,
        Err(TournamentError::IllegalTransition { .. })
    ));

    let current = coordinator.get_tournament(tournament.id).await?;
    assert_eq!(current.status, TournamentStatus::InProgress);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_resubmission_after_rejection(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let coordinator = build_coordinator(pool, idle_generator());

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 4))
        .await?;
    let first = coordinator.submit_registration(tournament.id, "ana").await?;

    let duplicate = coordinator.submit_registration(tournament.id, "ana").await;
    assert!(matches!(
        duplicate,
        Err(TournamentError::DuplicateActiveRegistration { .. })
    ));

    coordinator
        .decide_registration(first.id, RegistrationStatus::Rejected, None)
        .await?;
    assert_eq!(
        coordinator
            .find_active_registration(tournament.id, "ana")
            .await?,
        None
    );

    let second = coordinator.submit_registration(tournament.id, "ana").await?;
    assert_ne!(second.id, first.id);
    assert_eq!(
        coordinator
            .find_active_registration(tournament.id, "ana")
            .await?
            .map(|r| r.id),
        Some(second.id)
    );

    let all: Vec<_> = coordinator
        .list_registrations(tournament.id, RegistrationQuery::default())
        .await?
        .try_collect()
        .await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, first.id);
    assert_eq!(all[0].status, RegistrationStatus::Rejected);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_cancelled_tournament_is_frozen(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let coordinator = build_coordinator(pool, idle_generator());
    let mut signals = coordinator.signals().subscribe();

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 4))
        .await?;
    let pending = coordinator.submit_registration(tournament.id, "ana").await?;

    let cancelled = coordinator
        .transition(tournament.id, TournamentStatus::Cancelled)
        .await?;
    assert_eq!(cancelled.status, TournamentStatus::Cancelled);
    assert!(cancelled.ended_at.is_some());

    let signal = signals.try_recv()?;
    assert_eq!(signal.kind, SignalKind::Cancelled);
    assert_eq!(signal.outcome, SignalOutcome::Success);

    let late = coordinator.submit_registration(tournament.id, "bo").await;
    assert!(matches!(late, Err(TournamentError::TournamentNotOpen(_))));

    let decision = coordinator
        .decide_registration(pending.id, RegistrationStatus::Accepted, None)
        .await;
    assert!(matches!(
        decision,
        Err(TournamentError::TournamentNotOpen(_))
    ));

    for target in [
        TournamentStatus::OpenForRegistration,
        TournamentStatus::InProgress,
        TournamentStatus::Finished,
    ] {
        let result = coordinator.transition(tournament.id, target).await;
        assert!(
            matches!(result, Err(TournamentError::IllegalTransition { .. })),
            "{} should be rejected",
            target
        );
    }

    let edit = coordinator
        .update_tournament(
            tournament.id,
            UpdateTournament {
                name: Some(String::from("Renamed")),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(edit, Err(TournamentError::BadRequest(_))));
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_finish_requires_start(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let mut generator = MockBracketService::new();
    generator
        .expect_generate_bracket()
        .times(1)
        .returning(|request| Ok(generated_bracket(&request)));
    let coordinator = build_coordinator(pool, Arc::new(generator));

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 4))
        .await?;

    let skipped = coordinator
        .transition(tournament.id, TournamentStatus::Finished)
        .await;
    assert!(matches!(
        skipped,
        Err(TournamentError::IllegalTransition { .. })
    ));

    coordinator
        .transition(tournament.id, TournamentStatus::InProgress)
        .await?;
    let finished = coordinator
        .transition(tournament.id, TournamentStatus::Finished)
        .await?;
    assert_eq!(finished.status, TournamentStatus::Finished);
    assert!(finished.started_at.is_some());
    assert!(finished.ended_at.is_some());
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_concurrent_acceptance_respects_capacity(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let coordinator = Arc::new(build_coordinator(pool, idle_generator()));

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 3))
        .await?;
    let mut registrations = Vec::new();
    for i in 0..10 {
        registrations.push(
            coordinator
                .submit_registration(tournament.id, &format!("player-{}", i))
                .await?,
        );
    }

    let handles = registrations.iter().map(|registration| {
        let coordinator = coordinator.clone();
        let registration_id = registration.id;
        tokio::spawn(async move {
            coordinator
                .decide_registration(registration_id, RegistrationStatus::Accepted, None)
                .await
        })
    });
    let results = join_all(handles).await;

    let mut accepted = 0;
    for result in results {
        match result? {
            Ok(_) => accepted += 1,
            Err(TournamentError::CapacityExceeded { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(coordinator.capacity(tournament.id).await?.accepted, 3);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_capacity_holds_across_coordinators(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    // separate lock tables, only the guarded write keeps them apart
    let first = build_coordinator(pool.clone(), idle_generator());
    let second = build_coordinator(pool, idle_generator());

    let tournament = first
        .create_tournament(create_request(ParticipationType::Individual, 2))
        .await?;
    let mut registrations = Vec::new();
    for subject in ["ana", "bo", "cy", "di"] {
        registrations.push(first.submit_registration(tournament.id, subject).await?);
    }

    let (a, b) = tokio::join!(
        async {
            let mut results = Vec::new();
            for registration in &registrations[..2] {
                results.push(
                    first
                        .decide_registration(registration.id, RegistrationStatus::Accepted, None)
                        .await,
                );
            }
            results
        },
        async {
            let mut results = Vec::new();
            for registration in &registrations[2..] {
                results.push(
                    second
                        .decide_registration(registration.id, RegistrationStatus::Accepted, None)
                        .await,
                );
            }
            results
        }
    );

    let accepted = a.iter().chain(b.iter()).filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 2);
    assert!(a.iter().chain(b.iter()).all(|r| matches!(
        r,
        Ok(_) | Err(TournamentError::CapacityExceeded { .. })
    )));
    assert_eq!(first.capacity(tournament.id).await?.accepted, 2);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_racing_decisions_report_the_lost_race(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let first = build_coordinator(pool.clone(), idle_generator());
    let second = build_coordinator(pool, idle_generator());

    // plenty of room, so a lost write can only mean the other decision won
    let tournament = first
        .create_tournament(create_request(ParticipationType::Individual, 100))
        .await?;

    for round in 0..40 {
        let registration = first
            .submit_registration(tournament.id, &format!("player-{}", round))
            .await?;
        let (accepted, rejected) = tokio::join!(
            first.decide_registration(registration.id, RegistrationStatus::Accepted, None),
            second.decide_registration(registration.id, RegistrationStatus::Rejected, None)
        );

        for result in [&accepted, &rejected] {
            assert!(
                matches!(result, Ok(_) | Err(TournamentError::IllegalTransition { .. })),
                "round {}: {:?}",
                round,
                result
            );
        }
        assert!(accepted.is_ok() || rejected.is_ok(), "round {}", round);
    }

    let capacity = first.capacity(tournament.id).await?;
    assert_eq!(capacity.pending, 0);
    assert_eq!(capacity.accepted + capacity.rejected, 40);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_snapshot_is_frozen_in_submission_order(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let mut generator = MockBracketService::new();
    generator
        .expect_generate_bracket()
        .withf(|request| {
            request
                .participants
                .iter()
                .map(|p| (p.subject_id.as_str(), p.seed))
                .eq([("ana", 1), ("cy", 2), ("di", 3)])
                && !request.is_team_tournament
        })
        .times(1)
        .returning(|request| Ok(generated_bracket(&request)));
    let coordinator = build_coordinator(pool, Arc::new(generator));

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Individual, 8))
        .await?;
    let mut registrations = Vec::new();
    for subject in ["ana", "bo", "cy", "di"] {
        registrations.push(coordinator.submit_registration(tournament.id, subject).await?);
    }
    // decided out of order, seeding follows submission
    for index in [3, 0, 2] {
        coordinator
            .decide_registration(registrations[index].id, RegistrationStatus::Accepted, None)
            .await?;
    }
    coordinator
        .decide_registration(registrations[1].id, RegistrationStatus::Rejected, None)
        .await?;

    let started = coordinator.promote_to_in_progress(tournament.id).await?;
    let snapshot = started.participants.clone().unwrap_or_default();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[0].registration_id, registrations[0].id);

    let late = coordinator
        .decide_registration(registrations[1].id, RegistrationStatus::Pending, None)
        .await;
    assert!(matches!(late, Err(TournamentError::TournamentNotOpen(_))));

    let reread = coordinator.get_tournament(tournament.id).await?;
    assert_eq!(reread.participants, started.participants);
    Ok(())
}

#[sqlx::test(migrations = "./migrations/tournaments")]
async fn test_delete_removes_registrations(pool: SqlitePool) -> anyhow::Result<()> {
    setup_logs();
    let coordinator = build_coordinator(pool, idle_generator());

    let tournament = coordinator
        .create_tournament(create_request(ParticipationType::Team, 4))
        .await?;
    let registration = coordinator
        .submit_registration(tournament.id, "team-a")
        .await?;

    coordinator.delete_tournament(tournament.id).await?;

    assert!(matches!(
        coordinator.get_tournament(tournament.id).await,
        Err(TournamentError::NotFound(_))
    ));
    assert!(matches!(
        coordinator.get_registration(registration.id).await,
        Err(TournamentError::NotFound(_))
    ));
    assert!(matches!(
        coordinator.delete_tournament(tournament.id).await,
        Err(TournamentError::NotFound(_))
    ));
    Ok(())
}
