use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use time::OffsetDateTime;
use tourney_core::{
    ensure_slot_available, validate_create_tournament, validate_subject_id,
    validate_update_tournament, CapacitySummary, CreateTournament, LifecycleSignal,
    RegistrationQuery, RegistrationStatus, TournamentStatus, UpdateTournament,
};
use uuid::Uuid;

use crate::{
    domain::Error,
    infra::{
        bracket::{BracketGenerator, GenerateBracket},
        db::is_unique_violation,
    },
};

use super::{
    Registration, SeededParticipant, SignalHub, Tournament, TournamentLocks, TournamentStore,
    TournamentView,
};

/// Runs the tournament lifecycle: registrations, moderation, status
/// transitions and the promotion into a seeded bracket.
pub struct Coordinator {
    store: Arc<TournamentStore>,
    bracket_generator: Arc<dyn BracketGenerator>,
    locks: TournamentLocks,
    signals: SignalHub,
    bracket_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        store: TournamentStore,
        bracket_generator: Arc<dyn BracketGenerator>,
        signals: SignalHub,
        bracket_timeout: Duration,
    ) -> Self {
        Self {
            store: Arc::new(store),
            bracket_generator,
            locks: TournamentLocks::new(),
            signals,
            bracket_timeout,
        }
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.store.ping().await.map_err(Error::DbError)
    }

    pub fn signals(&self) -> &SignalHub {
        &self.signals
    }

    pub async fn create_tournament(&self, request: CreateTournament) -> Result<Tournament, Error> {
        validate_create_tournament(&request).map_err(|e| Error::BadRequest(e.to_string()))?;

        let tournament = Tournament::new(request);
        self.store.add_tournament(&tournament).await.map_err(|e| {
            error!("failed to add tournament {}: {:?}", tournament.id, e);
            Error::DbError(e)
        })?;
        info!(
            "tournament {} created for {} {} participants",
            tournament.id, tournament.max_participants, tournament.participation_type
        );

        Ok(tournament)
    }

    pub async fn get_tournament(&self, tournament_id: Uuid) -> Result<Tournament, Error> {
        self.store
            .get_tournament(tournament_id)
            .await
            .map_err(|e| {
                error!(
                    "failed to get tournament: tournament_id {} {:?}",
                    tournament_id, e
                );
                Error::DbError(e)
            })?
            .ok_or_else(|| Error::NotFound(format!("tournament {} not found", tournament_id)))
    }

    pub async fn get_tournament_view(&self, tournament_id: Uuid) -> Result<TournamentView, Error> {
        let tournament = self.get_tournament(tournament_id).await?;
        let capacity = self
            .store
            .capacity(tournament.id, tournament.max_participants)
            .await?;
        Ok(TournamentView::new(tournament, &capacity))
    }

    pub async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> Result<Vec<TournamentView>, Error> {
        let tournaments = self.store.list_tournaments(status).await?;
        let mut views = Vec::with_capacity(tournaments.len());
        for tournament in tournaments {
            let capacity = self
                .store
                .capacity(tournament.id, tournament.max_participants)
                .await?;
            views.push(TournamentView::new(tournament, &capacity));
        }
        Ok(views)
    }

    pub async fn update_tournament(
        &self,
        tournament_id: Uuid,
        update: UpdateTournament,
    ) -> Result<Tournament, Error> {
        let current = self.get_tournament(tournament_id).await?;
        validate_update_tournament(&update, (current.start_date, current.end_date))
            .map_err(|e| Error::BadRequest(e.to_string()))?;

        let updated = self
            .store
            .update_details(tournament_id, update, OffsetDateTime::now_utc())
            .await?;
        if !updated {
            let tournament = self.get_tournament(tournament_id).await?;
            return Err(Error::BadRequest(format!(
                "tournament {} is {} and can no longer be edited",
                tournament_id, tournament.status
            )));
        }

        self.get_tournament(tournament_id).await
    }

    /// Waits for any in-flight decision or promotion before removing the
    /// tournament and its registrations.
    pub async fn delete_tournament(&self, tournament_id: Uuid) -> Result<(), Error> {
        let _guard = self.locks.acquire(tournament_id).await;
        let deleted = self.store.delete_tournament(tournament_id).await?;

        if !deleted {
            return Err(Error::NotFound(format!(
                "tournament {} not found",
                tournament_id
            )));
        }
        info!("tournament {} deleted", tournament_id);
        Ok(())
    }

    pub async fn capacity(&self, tournament_id: Uuid) -> Result<CapacitySummary, Error> {
        let tournament = self.get_tournament(tournament_id).await?;
        self.store
            .capacity(tournament.id, tournament.max_participants)
            .await
            .map_err(Error::DbError)
    }

    pub async fn submit_registration(
        &self,
        tournament_id: Uuid,
        subject_id: &str,
    ) -> Result<Registration, Error> {
        validate_subject_id(subject_id).map_err(|e| Error::BadRequest(e.to_string()))?;

        let tournament = self.get_tournament(tournament_id).await?;
        if !tournament.status.accepts_registrations() {
            return Err(Error::TournamentNotOpen(tournament_id));
        }

        let registration = Registration::new(&tournament, subject_id);
        let inserted = self
            .store
            .add_registration(&registration)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateActiveRegistration {
                        tournament_id,
                        subject_id: registration.subject_id.clone(),
                    }
                } else {
                    Error::DbError(e)
                }
            })?;

        // the tournament left registration between the read and the insert
        if !inserted {
            return Err(Error::TournamentNotOpen(tournament_id));
        }

        debug!(
            "registration {} submitted for {} in tournament {}",
            registration.id, registration.subject_id, tournament_id
        );
        Ok(registration)
    }

    pub async fn get_registration(&self, registration_id: Uuid) -> Result<Registration, Error> {
        self.store
            .get_registration(registration_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("registration {} not found", registration_id))
            })
    }

    pub async fn find_active_registration(
        &self,
        tournament_id: Uuid,
        subject_id: &str,
    ) -> Result<Option<Registration>, Error> {
        self.get_tournament(tournament_id).await?;
        self.store
            .find_active_registration(tournament_id, subject_id.trim())
            .await
            .map_err(Error::DbError)
    }

    /// Lazy listing; each call starts over from the first row.
    pub async fn list_registrations(
        &self,
        tournament_id: Uuid,
        query: RegistrationQuery,
    ) -> Result<BoxStream<'static, Result<Registration, Error>>, Error> {
        self.get_tournament(tournament_id).await?;
        Ok(self
            .store
            .stream_registrations(tournament_id, query)
            .map_err(Error::DbError)
            .boxed())
    }

    /// Moves a registration along its status machine. Acceptance is decided
    /// under the tournament lock and written with a capacity-guarded update.
    pub async fn decide_registration(
        &self,
        registration_id: Uuid,
        target: RegistrationStatus,
        decided_by: Option<String>,
    ) -> Result<Registration, Error> {
        let tournament_id = self.get_registration(registration_id).await?.tournament_id;
        let _guard = self.locks.acquire(tournament_id).await;

        self.decide_locked(registration_id, target, decided_by).await
    }

    async fn decide_locked(
        &self,
        registration_id: Uuid,
        target: RegistrationStatus,
        decided_by: Option<String>,
    ) -> Result<Registration, Error> {
        let registration = self.get_registration(registration_id).await?;
        let tournament = self.get_tournament(registration.tournament_id).await?;

        if !tournament.status.accepts_registrations() {
            return Err(Error::TournamentNotOpen(tournament.id));
        }
        registration
            .status
            .validate_decision(target)
            .map_err(|e| Error::from_core(e, tournament.id))?;

        let now = OffsetDateTime::now_utc();
        let written = match target {
            RegistrationStatus::Accepted => {
                let capacity = self
                    .store
                    .capacity(tournament.id, tournament.max_participants)
                    .await?;
                ensure_slot_available(tournament.max_participants, capacity.accepted)
                    .map_err(|e| Error::from_core(e, tournament.id))?;

                self.store
                    .accept_registration(registration.id, registration.status, now, decided_by)
                    .await?
            }
            RegistrationStatus::Rejected => {
                self.store
                    .update_registration_status(
                        registration.id,
                        registration.status,
                        target,
                        Some(now),
                        decided_by,
                    )
                    .await?
            }
            RegistrationStatus::Pending => self
                .store
                .update_registration_status(
                    registration.id,
                    registration.status,
                    target,
                    None,
                    decided_by,
                )
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        Error::DuplicateActiveRegistration {
                            tournament_id: tournament.id,
                            subject_id: registration.subject_id.clone(),
                        }
                    } else {
                        Error::DbError(e)
                    }
                })?,
        };

        if !written {
            let cause = self.missed_decision_cause(&registration, target).await?;
            return Err(cause);
        }

        info!(
            "registration {} moved from {} to {} in tournament {}",
            registration.id, registration.status, target, tournament.id
        );
        self.get_registration(registration_id).await
    }

    /// Explains a guarded decision write that matched no row. Another
    /// coordinator on the same database can move the registration, close the
    /// tournament or take the last slot between our read and the write.
    async fn missed_decision_cause(
        &self,
        expected: &Registration,
        target: RegistrationStatus,
    ) -> Result<Error, Error> {
        let current = self.get_registration(expected.id).await?;
        if current.status != expected.status {
            return Ok(Error::IllegalTransition {
                from: current.status.to_string(),
                to: target.to_string(),
            });
        }

        let tournament = self.get_tournament(current.tournament_id).await?;
        if !tournament.status.accepts_registrations() {
            return Ok(Error::TournamentNotOpen(tournament.id));
        }

        if target == RegistrationStatus::Accepted {
            let capacity = self
                .store
                .capacity(tournament.id, tournament.max_participants)
                .await?;
            if capacity.is_full() {
                return Ok(Error::CapacityExceeded {
                    tournament_id: tournament.id,
                    max_participants: tournament.max_participants,
                });
            }
        }

        // moved away and back before this read
        Ok(Error::IllegalTransition {
            from: current.status.to_string(),
            to: target.to_string(),
        })
    }

    /// Drives a status change. Starting a tournament goes through the bracket
    /// promotion, every other edge is a single conditional write.
    pub async fn transition(
        &self,
        tournament_id: Uuid,
        target: TournamentStatus,
    ) -> Result<Tournament, Error> {
        if target.requires_orchestration() {
            return self.promote_to_in_progress(tournament_id).await;
        }

        let _guard = self.locks.acquire(tournament_id).await;
        let result = self.transition_locked(tournament_id, target).await;
        self.signal_outcome(tournament_id, target, &result);
        result
    }

    async fn transition_locked(
        &self,
        tournament_id: Uuid,
        target: TournamentStatus,
    ) -> Result<Tournament, Error> {
        let tournament = self.get_tournament(tournament_id).await?;
        tournament
            .status
            .validate_transition(target)
            .map_err(|e| Error::from_core(e, tournament_id))?;

        let written = self
            .store
            .set_status(
                tournament_id,
                tournament.status,
                target,
                OffsetDateTime::now_utc(),
            )
            .await?;
        if !written {
            let current = self.get_tournament(tournament_id).await?;
            return Err(Error::IllegalTransition {
                from: current.status.to_string(),
                to: target.to_string(),
            });
        }

        info!(
            "tournament {} moved from {} to {}",
            tournament_id, tournament.status, target
        );
        self.get_tournament(tournament_id).await
    }

    /// Freezes the accepted participants, asks the bracket generator for a
    /// seeded bracket and commits `InProgress` only once the bracket exists.
    /// The lock is held throughout so no decision lands after the snapshot.
    /// On any failure the tournament stays open and a retry starts over.
    pub async fn promote_to_in_progress(&self, tournament_id: Uuid) -> Result<Tournament, Error> {
        let _guard = self.locks.acquire(tournament_id).await;
        let result = self.promote_locked(tournament_id).await;
        self.signal_outcome(tournament_id, TournamentStatus::InProgress, &result);
        result
    }

    async fn promote_locked(&self, tournament_id: Uuid) -> Result<Tournament, Error> {
        let tournament = self.get_tournament(tournament_id).await?;
        tournament
            .status
            .validate_transition(TournamentStatus::InProgress)
            .map_err(|e| Error::from_core(e, tournament_id))?;

        let accepted = self.store.accepted_registrations(tournament_id).await?;
        let participants = SeededParticipant::seed_all(&accepted);
        debug!(
            "promoting tournament {} with {} seeded participants",
            tournament_id,
            participants.len()
        );

        let request = GenerateBracket {
            tournament_id,
            format: tournament.format,
            is_team_tournament: tournament.participation_type.is_team(),
            participants: participants.clone(),
        };
        let bracket = match tokio::time::timeout(
            self.bracket_timeout,
            self.bracket_generator.generate_bracket(request),
        )
        .await
        {
            Ok(Ok(bracket)) => bracket,
            Ok(Err(e)) => return Err(Error::BracketGenerationFailed(e.to_string())),
            Err(_) => {
                return Err(Error::BracketGenerationFailed(format!(
                    "no bracket within {:?}",
                    self.bracket_timeout
                )))
            }
        };

        let committed = match self
            .store
            .commit_promotion(
                tournament_id,
                bracket.bracket_id,
                &participants,
                OffsetDateTime::now_utc(),
            )
            .await
        {
            Ok(committed) => committed,
            Err(e) => return self.confirm_promotion(tournament_id, bracket.bracket_id, e).await,
        };
        if !committed {
            let current = self.get_tournament(tournament_id).await?;
            return Err(Error::IllegalTransition {
                from: current.status.to_string(),
                to: TournamentStatus::InProgress.to_string(),
            });
        }

        info!(
            "tournament {} started with bracket {} ({} seeded matches)",
            tournament_id,
            bracket.bracket_id,
            bracket.seeded_matches.len()
        );
        self.get_tournament(tournament_id).await
    }

    /// A commit that errored, typically a write timeout, may still have landed.
    /// The bracket id tells whether it was ours.
    async fn confirm_promotion(
        &self,
        tournament_id: Uuid,
        bracket_id: Uuid,
        error: sqlx::Error,
    ) -> Result<Tournament, Error> {
        warn!(
            "promotion commit for tournament {} reported an error, checking stored state: {}",
            tournament_id, error
        );
        let current = self.get_tournament(tournament_id).await?;
        if current.status == TournamentStatus::InProgress && current.bracket_id == Some(bracket_id)
        {
            info!(
                "tournament {} started with bracket {} despite the commit error",
                tournament_id, bracket_id
            );
            return Ok(current);
        }
        Err(Error::DbError(error))
    }

    fn signal_outcome(
        &self,
        tournament_id: Uuid,
        target: TournamentStatus,
        result: &Result<Tournament, Error>,
    ) {
        let Some(kind) = target.signal_kind() else {
            return;
        };
        match result {
            Ok(_) => self.signals.emit(LifecycleSignal::success(tournament_id, kind)),
            // a missing tournament has nobody watching it
            Err(Error::NotFound(_)) => {}
            Err(_) => self.signals.emit(LifecycleSignal::failure(tournament_id, kind)),
        }
    }
}
