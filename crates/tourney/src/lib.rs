pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod startup;

pub use api::routes::*;
pub use config::*;
pub use domain::{
    Coordinator, Error as TournamentError, Registration, SeededParticipant, SignalHub, Tournament,
    TournamentLocks, TournamentStore, TournamentView,
};
pub use infra::bracket::{
    BracketClient, BracketGenerator, Error as BracketError, GenerateBracket, GeneratedBracket,
};
pub use infra::db::*;
pub use infra::file_utils::*;
pub use startup::*;
