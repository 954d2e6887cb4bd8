mod system;
mod tournaments;

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use hyper::StatusCode;
use serde_json::json;

use crate::domain::Error;

pub use system::*;
pub use tournaments::*;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::TournamentNotOpen(_)
            | Error::DuplicateActiveRegistration { .. }
            | Error::CapacityExceeded { .. }
            | Error::IllegalTransition { .. } => (StatusCode::CONFLICT, self.to_string()),
            Error::BracketGenerationFailed(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Error::DbError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("internal server error"),
            ),
        };
        let body = Json(json!({
            "error": error_message,
        }));
        (status, body).into_response()
    }
}
