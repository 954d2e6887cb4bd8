//! Shared types between the tourney service and its clients

use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};
use time::OffsetDateTime;

use crate::{CoreError, RegistrationStatus, TournamentStatus};

/// Who may register, fixed when the tournament is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationType {
    Individual,
    Team,
}

impl ParticipationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Team => "team",
        }
    }

    pub fn subject_kind(&self) -> SubjectKind {
        match self {
            Self::Individual => SubjectKind::User,
            Self::Team => SubjectKind::Team,
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, Self::Team)
    }
}

impl fmt::Display for ParticipationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ParticipationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "individual" => Ok(Self::Individual),
            "team" => Ok(Self::Team),
            val => Err(CoreError::Validation(format!(
                "unknown participation type: {}",
                val
            ))),
        }
    }
}

/// How a registration's subject id is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Team,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Team => "team",
        }
    }
}

impl FromStr for SubjectKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "team" => Ok(Self::Team),
            val => Err(CoreError::Validation(format!("unknown subject kind: {}", val))),
        }
    }
}

/// Elimination format handed to the bracket generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BracketFormat {
    #[default]
    SingleElimination,
    DoubleElimination,
}

impl BracketFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleElimination => "single_elimination",
            Self::DoubleElimination => "double_elimination",
        }
    }
}

impl FromStr for BracketFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_elimination" => Ok(Self::SingleElimination),
            "double_elimination" => Ok(Self::DoubleElimination),
            val => Err(CoreError::Validation(format!("unknown bracket format: {}", val))),
        }
    }
}

/// Request to create a tournament, always opened for registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTournament {
    pub name: String,
    /// Competition type, e.g. "valorant" or "free_fire"
    pub game: String,
    pub participation_type: ParticipationType,
    pub max_participants: u32,
    #[serde(default)]
    pub format: BracketFormat,
    /// e.g. "5v5", shown on the tournament card
    #[serde(default)]
    pub match_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rules: Option<String>,
    #[serde(default)]
    pub prize_pool: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_date: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_date: Option<OffsetDateTime>,
}

/// Editable details; participation type, capacity and format stay fixed.
///
/// An absent field is left as is. For the optional details an explicit
/// `null` clears the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTournament {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub game: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub match_type: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub rules: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Option::is_none"
    )]
    pub prize_pool: Option<Option<String>>,
    #[serde(
        default,
        with = "nullable_rfc3339",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<Option<OffsetDateTime>>,
    #[serde(
        default,
        with = "nullable_rfc3339",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<Option<OffsetDateTime>>,
}

/// Present fields always land in `Some`, so `null` reads as `Some(None)`
fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

mod nullable_rfc3339 {
    use serde::{Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S>(
        value: &Option<Option<OffsetDateTime>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time::serde::rfc3339::option::serialize(&value.flatten(), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        time::serde::rfc3339::option::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub target: TournamentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRegistration {
    pub subject_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub status: RegistrationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationSort {
    /// Insertion order
    #[default]
    SubmittedAt,
    DecidedAt,
    SubjectId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter and ordering for registration listings
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegistrationQuery {
    #[serde(default)]
    pub status: Option<RegistrationStatus>,
    #[serde(default)]
    pub sort: RegistrationSort,
    #[serde(default)]
    pub order: SortOrder,
}

impl RegistrationQuery {
    pub fn with_status(status: RegistrationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}
