use hyper::header::CONTENT_TYPE;
use log::{debug, error};
use mime::APPLICATION_JSON;
use reqwest_middleware::{
    self,
    reqwest::{Method, StatusCode, Url},
    ClientWithMiddleware,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tourney_core::BracketFormat;
use uuid::Uuid;

use crate::domain::SeededParticipant;

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem sending request to bracket service: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending request to bracket service: {0}")]
    SendMiddleware(#[from] reqwest_middleware::Error),
    #[error("problem requesting bracket service: {0}")]
    Request(String),
    #[error("bracket service rejected the participants: {0}")]
    BadRequest(String),
    #[error("bracket service temporarily unavailable: {0}")]
    Transient(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_))
    }
}

/// Frozen participant set handed over when a tournament starts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerateBracket {
    pub tournament_id: Uuid,
    pub format: BracketFormat,
    pub is_team_tournament: bool,
    /// Ordered by seed, seed 1 first
    pub participants: Vec<SeededParticipant>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedBracket {
    pub bracket_id: Uuid,
    /// Opaque to this service, stored and served by the bracket service
    #[serde(default)]
    pub seeded_matches: Vec<serde_json::Value>,
}

#[async_trait::async_trait]
pub trait BracketGenerator: Send + Sync {
    async fn generate_bracket(&self, request: GenerateBracket) -> Result<GeneratedBracket, Error>;
}

#[derive(Clone)]
pub struct BracketClient {
    pub base_url: Url,
    pub client: ClientWithMiddleware,
}

impl BracketClient {
    pub fn new(client: ClientWithMiddleware, base_url: &Url) -> Self {
        Self {
            base_url: base_url.to_owned(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl BracketGenerator for BracketClient {
    async fn generate_bracket(&self, request: GenerateBracket) -> Result<GeneratedBracket, Error> {
        debug!(
            "requesting bracket for tournament {} with {} participants",
            request.tournament_id,
            request.participants.len()
        );
        let url = self
            .base_url
            .join("/brackets")
            .map_err(|e| Error::Request(e.to_string()))?;

        let body = serde_json::to_vec(&request)
            .map_err(|e| Error::Request(format!("Failed to serialize bracket request: {}", e)))?;

        let response = self
            .client
            .request(Method::POST, url)
            .header(CONTENT_TYPE, APPLICATION_JSON.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("error sending to bracket service: {}", e);
                Error::SendMiddleware(e)
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<GeneratedBracket>().await.map_err(Into::into);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            Err(Error::BadRequest(body))
        } else if status == StatusCode::SERVICE_UNAVAILABLE
            || status == StatusCode::BAD_GATEWAY
            || status == StatusCode::GATEWAY_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(Error::Transient(format!(
                "error response from bracket service with status {}: {:?}",
                status, body
            )))
        } else {
            Err(Error::Request(format!(
                "error response from bracket service with status {}: {:?}",
                status, body
            )))
        }
    }
}
