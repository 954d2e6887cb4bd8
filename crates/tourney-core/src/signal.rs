//! Ephemeral lifecycle signals for the presentation layer.
//!
//! A signal is fire-and-forget: it is never stored and a missed one changes
//! nothing, the tournament status stays the source of truth.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Started,
    Ended,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSignal {
    pub tournament_id: Uuid,
    pub outcome: SignalOutcome,
    pub kind: SignalKind,
    #[serde(with = "time::serde::rfc3339")]
    pub emitted_at: OffsetDateTime,
}

impl LifecycleSignal {
    pub fn new(tournament_id: Uuid, kind: SignalKind, outcome: SignalOutcome) -> Self {
        Self {
            tournament_id,
            outcome,
            kind,
            emitted_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn success(tournament_id: Uuid, kind: SignalKind) -> Self {
        Self::new(tournament_id, kind, SignalOutcome::Success)
    }

    pub fn failure(tournament_id: Uuid, kind: SignalKind) -> Self {
        Self::new(tournament_id, kind, SignalOutcome::Failure)
    }

    /// Event name used on the SSE stream, e.g. `started.success`.
    pub fn event_name(&self) -> String {
        let kind = match self.kind {
            SignalKind::Started => "started",
            SignalKind::Ended => "ended",
            SignalKind::Cancelled => "cancelled",
        };
        let outcome = match self.outcome {
            SignalOutcome::Success => "success",
            SignalOutcome::Failure => "failure",
        };
        format!("{}.{}", kind, outcome)
    }
}
