mod coordinator;
mod locks;
mod signals;
mod store;

pub use coordinator::*;
pub use locks::*;
pub use signals::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::OffsetDateTime;
use tourney_core::{
    BracketFormat, CapacitySummary, CreateTournament, ParticipationType, RegistrationStatus,
    SubjectKind, TournamentStatus,
};
use uuid::Uuid;

use crate::infra::db::{
    parse_optional_blob_json, parse_optional_datetime, parse_optional_text,
    parse_required_datetime, parse_required_text,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeededParticipant {
    pub registration_id: Uuid,
    pub subject_id: String,
    /// 1-based, follows acceptance insertion order
    pub seed: u32,
}

impl SeededParticipant {
    /// Seeds follow the order the registrations were submitted in
    pub fn seed_all(accepted: &[Registration]) -> Vec<SeededParticipant> {
        accepted
            .iter()
            .zip(1u32..)
            .map(|(registration, seed)| SeededParticipant {
                registration_id: registration.id,
                subject_id: registration.subject_id.clone(),
                seed,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub game: String,
    pub participation_type: ParticipationType,
    pub max_participants: u32,
    pub format: BracketFormat,
    pub match_type: Option<String>,
    pub description: Option<String>,
    pub rules: Option<String>,
    pub prize_pool: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
    pub status: TournamentStatus,
    /// Set together with `InProgress`, never without it
    pub bracket_id: Option<Uuid>,
    pub participants: Option<Vec<SeededParticipant>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

impl Tournament {
    pub fn new(request: CreateTournament) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::now_v7(),
            name: request.name.trim().to_string(),
            game: request.game.trim().to_string(),
            participation_type: request.participation_type,
            max_participants: request.max_participants,
            format: request.format,
            match_type: request.match_type,
            description: request.description,
            rules: request.rules,
            prize_pool: request.prize_pool,
            start_date: request.start_date,
            end_date: request.end_date,
            status: TournamentStatus::OpenForRegistration,
            bracket_id: None,
            participants: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn subject_kind(&self) -> SubjectKind {
        self.participation_type.subject_kind()
    }
}

impl FromRow<'_, SqliteRow> for Tournament {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let max_participants: i64 = row.try_get("max_participants")?;
        Ok(Tournament {
            id: parse_required_text(row, "id")?,
            name: row.try_get("name")?,
            game: row.try_get("game")?,
            participation_type: parse_required_text(row, "participation_type")?,
            max_participants: u32::try_from(max_participants).map_err(|e| {
                sqlx::Error::ColumnDecode {
                    index: "max_participants".to_string(),
                    source: Box::new(e),
                }
            })?,
            format: parse_required_text(row, "format")?,
            match_type: row.try_get("match_type")?,
            description: row.try_get("description")?,
            rules: row.try_get("rules")?,
            prize_pool: row.try_get("prize_pool")?,
            start_date: parse_optional_datetime(row, "start_date")?,
            end_date: parse_optional_datetime(row, "end_date")?,
            status: parse_required_text(row, "status")?,
            bracket_id: parse_optional_text(row, "bracket_id")?,
            participants: parse_optional_blob_json(row, "participant_snapshot")?,
            created_at: parse_required_datetime(row, "created_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
            started_at: parse_optional_datetime(row, "started_at")?,
            ended_at: parse_optional_datetime(row, "ended_at")?,
        })
    }
}

/// Tournament plus the counts derived from its registrations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TournamentView {
    #[serde(flatten)]
    pub tournament: Tournament,
    pub registered_count: u32,
    pub remaining_slots: u32,
}

impl TournamentView {
    pub fn new(tournament: Tournament, capacity: &CapacitySummary) -> Self {
        Self {
            tournament,
            registered_count: capacity.accepted,
            remaining_slots: capacity.remaining_slots,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registration {
    pub id: Uuid,
    pub tournament_id: Uuid,
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    pub status: RegistrationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    /// Null while pending
    #[serde(with = "time::serde::rfc3339::option")]
    pub decided_at: Option<OffsetDateTime>,
    pub decided_by: Option<String>,
}

impl Registration {
    pub fn new(tournament: &Tournament, subject_id: &str) -> Self {
        Self {
            id: Uuid::now_v7(),
            tournament_id: tournament.id,
            subject_id: subject_id.trim().to_string(),
            subject_kind: tournament.subject_kind(),
            status: RegistrationStatus::Pending,
            submitted_at: OffsetDateTime::now_utc(),
            decided_at: None,
            decided_by: None,
        }
    }
}

impl FromRow<'_, SqliteRow> for Registration {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Registration {
            id: parse_required_text(row, "id")?,
            tournament_id: parse_required_text(row, "tournament_id")?,
            subject_id: row.try_get("subject_id")?,
            subject_kind: parse_required_text(row, "subject_kind")?,
            status: parse_required_text(row, "status")?,
            submitted_at: parse_required_datetime(row, "submitted_at")?,
            decided_at: parse_optional_datetime(row, "decided_at")?,
            decided_by: row.try_get("decided_by")?,
        })
    }
}
