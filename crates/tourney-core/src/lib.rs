//! tourney-core: lifecycle rules shared by the tourney service and its clients
//!
//! Everything in here is pure: status tables, capacity math and request
//! validation. Persistence and locking live in the `tourney` crate.

pub mod capacity;
pub mod errors;
pub mod signal;
pub mod status;
pub mod types;
pub mod validation;

pub use capacity::*;
pub use errors::*;
pub use signal::*;
pub use status::*;
pub use types::*;
pub use validation::*;
