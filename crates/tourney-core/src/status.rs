//! Status machines for tournaments and registrations.
//!
//! # Tournament flow
//!
//! ```text
//! OpenForRegistration ──────────→ Cancelled
//!     ↓ (promotion, generates the bracket)
//! InProgress ──────────────────→ Cancelled
//!     ↓
//! Finished
//! ```
//!
//! `Finished` and `Cancelled` are terminal. No edge skips a state, so a
//! tournament can never be finished without having been started.
//!
//! # Registration flow
//!
//! ```text
//! Pending ──→ Accepted ──→ Rejected
//!    │                        │
//!    └──────→ Rejected ──→ Pending (re-review)
//! ```
//!
//! `Accepted → Pending` is not an edge: an accepted participant can only
//! leave the pool through a rejection.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::{CoreError, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    OpenForRegistration,
    InProgress,
    Finished,
    Cancelled,
}

impl TournamentStatus {
    pub const ALL: [TournamentStatus; 4] = [
        TournamentStatus::OpenForRegistration,
        TournamentStatus::InProgress,
        TournamentStatus::Finished,
        TournamentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenForRegistration => "open_for_registration",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable in a single step from `self`.
    pub fn legal_targets(&self) -> &'static [TournamentStatus] {
        match self {
            Self::OpenForRegistration => &[Self::InProgress, Self::Cancelled],
            Self::InProgress => &[Self::Finished, Self::Cancelled],
            Self::Finished | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: TournamentStatus) -> bool {
        self.legal_targets().contains(&target)
    }

    /// Validate a single edge of the table.
    pub fn validate_transition(&self, target: TournamentStatus) -> Result<(), CoreError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(CoreError::IllegalTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Whether moving into `self` needs work beyond the status write.
    pub fn requires_orchestration(&self) -> bool {
        matches!(self, Self::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }

    pub fn accepts_registrations(&self) -> bool {
        matches!(self, Self::OpenForRegistration)
    }

    /// The signal emitted when a transition into `self` is attempted.
    pub fn signal_kind(&self) -> Option<SignalKind> {
        match self {
            Self::OpenForRegistration => None,
            Self::InProgress => Some(SignalKind::Started),
            Self::Finished => Some(SignalKind::Ended),
            Self::Cancelled => Some(SignalKind::Cancelled),
        }
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open_for_registration" => Ok(Self::OpenForRegistration),
            "in_progress" => Ok(Self::InProgress),
            "finished" => Ok(Self::Finished),
            "cancelled" => Ok(Self::Cancelled),
            val => Err(CoreError::Validation(format!(
                "unknown tournament status: {}",
                val
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn can_decide_to(&self, target: RegistrationStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Accepted)
                | (Self::Pending, Self::Rejected)
                | (Self::Rejected, Self::Pending)
                | (Self::Accepted, Self::Rejected)
        )
    }

    pub fn validate_decision(&self, target: RegistrationStatus) -> Result<(), CoreError> {
        if self.can_decide_to(target) {
            Ok(())
        } else {
            Err(CoreError::IllegalDecision {
                from: *self,
                to: target,
            })
        }
    }

    /// Active registrations block the subject from registering again.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            val => Err(CoreError::Validation(format!(
                "unknown registration status: {}",
                val
            ))),
        }
    }
}
