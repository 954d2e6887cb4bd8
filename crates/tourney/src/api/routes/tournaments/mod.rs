mod registration_routes;
mod signal_routes;
mod tournament_routes;

pub use registration_routes::*;
pub use signal_routes::*;
pub use tournament_routes::*;

use log::log;

use crate::domain::Error;

/// Capacity and duplicate refusals are routine moderation outcomes and log at info
fn log_failure(context: &str, error: &Error) {
    log!(error.log_level(), "error {}: {}", context, error);
}
