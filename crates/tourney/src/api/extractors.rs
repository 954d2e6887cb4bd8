use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

/// Header carrying the acting identifier supplied by the identity provider
pub const ACTOR_ID_HEADER: &str = "x-actor-id";

/// Who is acting on a request, as asserted by the identity provider in front
/// of this service. Not verified here, only recorded for audit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorId(pub Option<String>);

impl ActorId {
    pub fn into_inner(self) -> Option<String> {
        self.0
    }
}

impl<S> FromRequestParts<S> for ActorId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(String::from);

        Ok(ActorId(actor))
    }
}
