//! Shared error types

use thiserror::Error;

use crate::{RegistrationStatus, TournamentStatus};

/// Rule violations detected without touching storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("illegal tournament transition from {from} to {to}")]
    IllegalTransition {
        from: TournamentStatus,
        to: TournamentStatus,
    },

    #[error("illegal registration decision from {from} to {to}")]
    IllegalDecision {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },

    #[error("tournament is full, all {max_participants} slots are taken")]
    CapacityExceeded { max_participants: u32 },
}
