//! Slot accounting for tournaments.
//!
//! The accepted count is always derived from registration statuses, never
//! cached next to the tournament.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Gate an acceptance against the current accepted count.
pub fn ensure_slot_available(max_participants: u32, accepted: u32) -> Result<(), CoreError> {
    if accepted < max_participants {
        Ok(())
    } else {
        Err(CoreError::CapacityExceeded { max_participants })
    }
}

/// Waiting list counts for a single tournament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySummary {
    pub max_participants: u32,
    pub accepted: u32,
    pub pending: u32,
    pub rejected: u32,
    pub remaining_slots: u32,
}

impl CapacitySummary {
    pub fn from_counts(max_participants: u32, accepted: u32, pending: u32, rejected: u32) -> Self {
        Self {
            max_participants,
            accepted,
            pending,
            rejected,
            remaining_slots: max_participants.saturating_sub(accepted),
        }
    }

    pub fn is_full(&self) -> bool {
        self.remaining_slots == 0
    }
}
