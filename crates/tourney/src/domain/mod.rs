pub mod tournaments;

pub use tournaments::*;

use log::Level;
use thiserror::Error;
use tourney_core::CoreError;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("tournament {0} is not open for registration")]
    TournamentNotOpen(Uuid),
    #[error("{subject_id} already holds an active registration in tournament {tournament_id}")]
    DuplicateActiveRegistration {
        tournament_id: Uuid,
        subject_id: String,
    },
    #[error("tournament {tournament_id} is full, all {max_participants} slots are taken")]
    CapacityExceeded {
        tournament_id: Uuid,
        max_participants: u32,
    },
    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
    #[error("bracket generation failed: {0}")]
    BracketGenerationFailed(String),
    #[error("problem querying db: {0}")]
    DbError(#[from] sqlx::Error),
}

impl Error {
    /// Expected outcomes of moderation are not operational failures
    pub fn log_level(&self) -> Level {
        match self {
            Error::CapacityExceeded { .. } | Error::DuplicateActiveRegistration { .. } => {
                Level::Info
            }
            Error::NotFound(_)
            | Error::BadRequest(_)
            | Error::TournamentNotOpen(_)
            | Error::IllegalTransition { .. } => Level::Warn,
            Error::BracketGenerationFailed(_) | Error::DbError(_) => Level::Error,
        }
    }

    pub(crate) fn from_core(error: CoreError, tournament_id: Uuid) -> Self {
        match error {
            CoreError::Validation(msg) => Error::BadRequest(msg),
            CoreError::IllegalTransition { from, to } => Error::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            CoreError::IllegalDecision { from, to } => Error::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            CoreError::CapacityExceeded { max_participants } => Error::CapacityExceeded {
                tournament_id,
                max_participants,
            },
        }
    }
}
