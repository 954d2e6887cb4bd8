use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use super::bracket::{BracketGenerator, Error, GenerateBracket, GeneratedBracket};

/// In-process bracket generator, seeds round one like a standard bracket
/// (1 vs N, 2 vs N-1, ...) with byes for the top seeds when the field is short.
#[derive(Default)]
pub struct MockBracketGenerator {
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    generated: Arc<Mutex<HashMap<Uuid, GeneratedBracket>>>,
}

impl MockBracketGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with a transient error
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Hold every call for `delay` before answering
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn generated(&self, tournament_id: &Uuid) -> Option<GeneratedBracket> {
        self.generated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tournament_id)
            .cloned()
    }

    fn take_failure(&self) -> bool {
        self.failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }
}

fn first_round(request: &GenerateBracket) -> Vec<serde_json::Value> {
    let field = request.participants.len();
    let size = field.max(2).next_power_of_two();

    (1..=size / 2)
        .map(|seed| {
            let home = request.participants.get(seed - 1);
            let away = request.participants.get(size - seed);
            json!({
                "round": 1,
                "slot": seed,
                "home": home.map(|p| &p.subject_id),
                "home_seed": home.map(|p| p.seed),
                "away": away.map(|p| &p.subject_id),
                "away_seed": away.map(|p| p.seed),
                "bye": away.is_none(),
            })
        })
        .collect()
}

#[async_trait]
impl BracketGenerator for MockBracketGenerator {
    async fn generate_bracket(&self, request: GenerateBracket) -> Result<GeneratedBracket, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.take_failure() {
            return Err(Error::Transient(format!(
                "mock bracket service refused tournament {}",
                request.tournament_id
            )));
        }

        let bracket = GeneratedBracket {
            bracket_id: Uuid::now_v7(),
            seeded_matches: first_round(&request),
        };
        self.generated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.tournament_id, bracket.clone());

        Ok(bracket)
    }
}
