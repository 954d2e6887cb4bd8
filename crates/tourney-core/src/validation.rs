//! Validation utilities shared between server and client

use crate::{CoreError, CreateTournament, UpdateTournament};
use time::OffsetDateTime;

/// Smallest bracket that can produce a match
pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 999;

pub fn validate_create_tournament(request: &CreateTournament) -> Result<(), CoreError> {
    validate_name(&request.name)?;
    if request.game.trim().is_empty() {
        return Err(CoreError::Validation("game cannot be empty".into()));
    }
    if !(MIN_PARTICIPANTS..=MAX_PARTICIPANTS).contains(&request.max_participants) {
        return Err(CoreError::Validation(format!(
            "max_participants must be between {} and {}",
            MIN_PARTICIPANTS, MAX_PARTICIPANTS
        )));
    }
    validate_dates(request.start_date, request.end_date)
}

/// `current` holds the stored dates so a partial update is checked against them.
pub fn validate_update_tournament(
    request: &UpdateTournament,
    current: (Option<OffsetDateTime>, Option<OffsetDateTime>),
) -> Result<(), CoreError> {
    if let Some(name) = &request.name {
        validate_name(name)?;
    }
    if let Some(game) = &request.game {
        if game.trim().is_empty() {
            return Err(CoreError::Validation("game cannot be empty".into()));
        }
    }
    validate_dates(
        request.start_date.unwrap_or(current.0),
        request.end_date.unwrap_or(current.1),
    )
}

pub fn validate_subject_id(subject_id: &str) -> Result<(), CoreError> {
    if subject_id.trim().is_empty() {
        return Err(CoreError::Validation("subject_id cannot be empty".into()));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::Validation("name cannot be empty".into()));
    }
    Ok(())
}

fn validate_dates(
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
) -> Result<(), CoreError> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(CoreError::Validation(
                "end_date cannot be before start_date".into(),
            ));
        }
    }
    Ok(())
}
