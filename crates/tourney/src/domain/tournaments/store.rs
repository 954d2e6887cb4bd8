use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use log::debug;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tourney_core::{
    CapacitySummary, RegistrationQuery, RegistrationSort, RegistrationStatus, SortOrder,
    TournamentStatus, UpdateTournament,
};
use uuid::Uuid;

use crate::infra::db::{format_optional_timestamp, format_timestamp, DBConnection};

use super::{Registration, SeededParticipant, Tournament};

const TOURNAMENT_COLUMNS: &str = "id, name, game, participation_type, max_participants, format, \
     match_type, description, rules, prize_pool, start_date, end_date, status, bracket_id, \
     participant_snapshot, created_at, updated_at, started_at, ended_at";

const REGISTRATION_COLUMNS: &str =
    "id, tournament_id, subject_id, subject_kind, status, submitted_at, decided_at, decided_by";

/// Rows fetched per round trip while streaming a registration listing
const LISTING_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct TournamentStore {
    db_connection: DBConnection,
}

impl TournamentStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    pub async fn add_tournament(&self, tournament: &Tournament) -> Result<(), sqlx::Error> {
        let id = tournament.id.to_string();
        let name = tournament.name.clone();
        let game = tournament.game.clone();
        let participation_type = tournament.participation_type.as_str();
        let max_participants = i64::from(tournament.max_participants);
        let format = tournament.format.as_str();
        let match_type = tournament.match_type.clone();
        let description = tournament.description.clone();
        let rules = tournament.rules.clone();
        let prize_pool = tournament.prize_pool.clone();
        let start_date = format_optional_timestamp(tournament.start_date)?;
        let end_date = format_optional_timestamp(tournament.end_date)?;
        let status = tournament.status.as_str();
        let created_at = format_timestamp(tournament.created_at)?;
        let updated_at = format_timestamp(tournament.updated_at)?;

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query(
                    "INSERT INTO tournaments (
                        id, name, game, participation_type, max_participants, format,
                        match_type, description, rules, prize_pool, start_date, end_date,
                        status, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(id)
                .bind(name)
                .bind(game)
                .bind(participation_type)
                .bind(max_participants)
                .bind(format)
                .bind(match_type)
                .bind(description)
                .bind(rules)
                .bind(prize_pool)
                .bind(start_date)
                .bind(end_date)
                .bind(status)
                .bind(created_at)
                .bind(updated_at)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn get_tournament(&self, id: Uuid) -> Result<Option<Tournament>, sqlx::Error> {
        sqlx::query_as::<_, Tournament>(&format!(
            "SELECT {} FROM tournaments WHERE id = ?",
            TOURNAMENT_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// Newest first
    pub async fn list_tournaments(
        &self,
        status: Option<TournamentStatus>,
    ) -> Result<Vec<Tournament>, sqlx::Error> {
        match status {
            Some(status) => {
                sqlx::query_as::<_, Tournament>(&format!(
                    "SELECT {} FROM tournaments WHERE status = ? ORDER BY rowid DESC",
                    TOURNAMENT_COLUMNS
                ))
                .bind(status.as_str())
                .fetch_all(self.db_connection.read())
                .await
            }
            None => {
                sqlx::query_as::<_, Tournament>(&format!(
                    "SELECT {} FROM tournaments ORDER BY rowid DESC",
                    TOURNAMENT_COLUMNS
                ))
                .fetch_all(self.db_connection.read())
                .await
            }
        }
    }

    /// Only touches tournaments that are not terminal; returns whether a row changed.
    /// Optional details are cleared when the update carries an explicit null.
    pub async fn update_details(
        &self,
        id: Uuid,
        update: UpdateTournament,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let updated_at = format_timestamp(now)?;
        let name = update.name.map(|name| name.trim().to_string());
        let game = update.game.map(|game| game.trim().to_string());
        let (set_match_type, match_type) = patch(update.match_type);
        let (set_description, description) = patch(update.description);
        let (set_rules, rules) = patch(update.rules);
        let (set_prize_pool, prize_pool) = patch(update.prize_pool);
        let (set_start_date, start_date) = patch(update.start_date);
        let start_date = format_optional_timestamp(start_date)?;
        let (set_end_date, end_date) = patch(update.end_date);
        let end_date = format_optional_timestamp(end_date)?;

        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE tournaments SET
                        name = COALESCE(?, name),
                        game = COALESCE(?, game),
                        match_type = CASE WHEN ? THEN ? ELSE match_type END,
                        description = CASE WHEN ? THEN ? ELSE description END,
                        rules = CASE WHEN ? THEN ? ELSE rules END,
                        prize_pool = CASE WHEN ? THEN ? ELSE prize_pool END,
                        start_date = CASE WHEN ? THEN ? ELSE start_date END,
                        end_date = CASE WHEN ? THEN ? ELSE end_date END,
                        updated_at = ?
                    WHERE id = ? AND status IN ('open_for_registration', 'in_progress')",
                )
                .bind(name)
                .bind(game)
                .bind(set_match_type)
                .bind(match_type)
                .bind(set_description)
                .bind(description)
                .bind(set_rules)
                .bind(rules)
                .bind(set_prize_pool)
                .bind(prize_pool)
                .bind(set_start_date)
                .bind(start_date)
                .bind(set_end_date)
                .bind(end_date)
                .bind(updated_at)
                .bind(id)
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    /// Registrations go with it through the foreign key cascade
    pub async fn delete_tournament(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query("DELETE FROM tournaments WHERE id = ?")
                    .bind(id)
                    .execute(&pool)
                    .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    /// Conditional status write, applied only while the row still holds `from`.
    pub async fn set_status(
        &self,
        id: Uuid,
        from: TournamentStatus,
        to: TournamentStatus,
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let updated_at = format_timestamp(now)?;
        let ended_at = if to.is_terminal() {
            Some(updated_at.clone())
        } else {
            None
        };

        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE tournaments
                    SET status = ?, updated_at = ?, ended_at = COALESCE(?, ended_at)
                    WHERE id = ? AND status = ?",
                )
                .bind(to.as_str())
                .bind(updated_at)
                .bind(ended_at)
                .bind(id)
                .bind(from.as_str())
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    /// Status, bracket and participant snapshot land in one statement or not at all.
    pub async fn commit_promotion(
        &self,
        id: Uuid,
        bracket_id: Uuid,
        participants: &[SeededParticipant],
        now: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let bracket_id = bracket_id.to_string();
        let snapshot =
            serde_json::to_vec(participants).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let started_at = format_timestamp(now)?;

        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE tournaments
                    SET status = 'in_progress',
                        bracket_id = ?,
                        participant_snapshot = ?,
                        started_at = ?,
                        updated_at = ?
                    WHERE id = ? AND status = 'open_for_registration'",
                )
                .bind(bracket_id)
                .bind(snapshot)
                .bind(&started_at)
                .bind(&started_at)
                .bind(id)
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    /// Inserts a pending registration only while the tournament is open.
    /// A unique violation means the subject already holds an active registration.
    pub async fn add_registration(&self, registration: &Registration) -> Result<bool, sqlx::Error> {
        let id = registration.id.to_string();
        let tournament_id = registration.tournament_id.to_string();
        let subject_id = registration.subject_id.clone();
        let subject_kind = registration.subject_kind.as_str();
        let submitted_at = format_timestamp(registration.submitted_at)?;

        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "INSERT INTO registrations
                        (id, tournament_id, subject_id, subject_kind, status, submitted_at)
                    SELECT ?, ?, ?, ?, 'pending', ?
                    WHERE EXISTS (
                        SELECT 1 FROM tournaments
                        WHERE id = ? AND status = 'open_for_registration'
                    )",
                )
                .bind(id)
                .bind(&tournament_id)
                .bind(subject_id)
                .bind(subject_kind)
                .bind(submitted_at)
                .bind(&tournament_id)
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    pub async fn get_registration(&self, id: Uuid) -> Result<Option<Registration>, sqlx::Error> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations WHERE id = ?",
            REGISTRATION_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(self.db_connection.read())
        .await
    }

    pub async fn find_active_registration(
        &self,
        tournament_id: Uuid,
        subject_id: &str,
    ) -> Result<Option<Registration>, sqlx::Error> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations
            WHERE tournament_id = ? AND subject_id = ? AND status != 'rejected'",
            REGISTRATION_COLUMNS
        ))
        .bind(tournament_id.to_string())
        .bind(subject_id)
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// Accepted registrations in the order they were submitted
    pub async fn accepted_registrations(
        &self,
        tournament_id: Uuid,
    ) -> Result<Vec<Registration>, sqlx::Error> {
        sqlx::query_as::<_, Registration>(&format!(
            "SELECT {} FROM registrations
            WHERE tournament_id = ? AND status = 'accepted'
            ORDER BY rowid ASC",
            REGISTRATION_COLUMNS
        ))
        .bind(tournament_id.to_string())
        .fetch_all(self.db_connection.read())
        .await
    }

    pub async fn capacity(
        &self,
        tournament_id: Uuid,
        max_participants: u32,
    ) -> Result<CapacitySummary, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM registrations
            WHERE tournament_id = ? GROUP BY status",
        )
        .bind(tournament_id.to_string())
        .fetch_all(self.db_connection.read())
        .await?;

        let (mut accepted, mut pending, mut rejected) = (0u32, 0u32, 0u32);
        for (status, count) in rows {
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            match status.parse::<RegistrationStatus>() {
                Ok(RegistrationStatus::Accepted) => accepted = count,
                Ok(RegistrationStatus::Pending) => pending = count,
                Ok(RegistrationStatus::Rejected) => rejected = count,
                Err(e) => {
                    return Err(sqlx::Error::ColumnDecode {
                        index: "status".to_string(),
                        source: Box::new(e),
                    })
                }
            }
        }

        Ok(CapacitySummary::from_counts(
            max_participants,
            accepted,
            pending,
            rejected,
        ))
    }

    /// Single statement acceptance: the row flips to accepted only if the
    /// tournament is still open and has a free slot at the moment of the write.
    pub async fn accept_registration(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        decided_at: OffsetDateTime,
        decided_by: Option<String>,
    ) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let decided_at = format_timestamp(decided_at)?;

        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE registrations
                    SET status = 'accepted', decided_at = ?, decided_by = ?
                    WHERE id = ? AND status = ?
                      AND (SELECT t.status FROM tournaments t
                           WHERE t.id = registrations.tournament_id) = 'open_for_registration'
                      AND (SELECT COUNT(*) FROM registrations r
                           WHERE r.tournament_id = registrations.tournament_id
                             AND r.status = 'accepted')
                          < (SELECT t.max_participants FROM tournaments t
                             WHERE t.id = registrations.tournament_id)",
                )
                .bind(decided_at)
                .bind(decided_by)
                .bind(id)
                .bind(from.as_str())
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    /// Rejections and re-reviews. `decided_at` is cleared when going back to pending.
    pub async fn update_registration_status(
        &self,
        id: Uuid,
        from: RegistrationStatus,
        to: RegistrationStatus,
        decided_at: Option<OffsetDateTime>,
        decided_by: Option<String>,
    ) -> Result<bool, sqlx::Error> {
        let id = id.to_string();
        let decided_at = format_optional_timestamp(decided_at)?;

        let rows = self
            .db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query(
                    "UPDATE registrations
                    SET status = ?, decided_at = ?, decided_by = ?
                    WHERE id = ? AND status = ?
                      AND (SELECT t.status FROM tournaments t
                           WHERE t.id = registrations.tournament_id) = 'open_for_registration'",
                )
                .bind(to.as_str())
                .bind(decided_at)
                .bind(decided_by)
                .bind(id)
                .bind(from.as_str())
                .execute(&pool)
                .await?;
                Ok(result.rows_affected())
            })
            .await?;
        Ok(rows > 0)
    }

    /// Lazily pages through a tournament's registrations. Every call starts a
    /// fresh listing, and the stream ends after the last page.
    pub fn stream_registrations(
        &self,
        tournament_id: Uuid,
        query: RegistrationQuery,
    ) -> BoxStream<'static, Result<Registration, sqlx::Error>> {
        let cursor = ListingCursor {
            pool: self.db_connection.read().clone(),
            sql: registration_listing_sql(&query),
            tournament_id: tournament_id.to_string(),
            status: query.status,
            offset: 0,
            exhausted: false,
        };
        debug!("registration listing: {}", cursor.sql);

        futures::stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.exhausted {
                return Ok::<_, sqlx::Error>(None);
            }

            let page = {
                let mut listing = sqlx::query_as::<_, Registration>(&cursor.sql)
                    .bind(cursor.tournament_id.clone());
                if let Some(status) = cursor.status {
                    listing = listing.bind(status.as_str());
                }
                listing
                    .bind(LISTING_PAGE_SIZE)
                    .bind(cursor.offset)
                    .fetch_all(&cursor.pool)
                    .await?
            };

            cursor.exhausted = (page.len() as i64) < LISTING_PAGE_SIZE;
            cursor.offset += page.len() as i64;
            Ok(Some((page, cursor)))
        })
        .map_ok(|page| futures::stream::iter(page.into_iter().map(Ok::<_, sqlx::Error>)))
        .try_flatten()
        .boxed()
    }
}

struct ListingCursor {
    pool: SqlitePool,
    sql: String,
    tournament_id: String,
    status: Option<RegistrationStatus>,
    offset: i64,
    exhausted: bool,
}

fn registration_listing_sql(query: &RegistrationQuery) -> String {
    let direction = match query.order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let order_by = match query.sort {
        RegistrationSort::SubmittedAt => format!("submitted_at {0}, rowid {0}", direction),
        // undecided rows last either way
        RegistrationSort::DecidedAt => {
            format!("decided_at IS NULL, decided_at {}, rowid ASC", direction)
        }
        RegistrationSort::SubjectId => format!("subject_id {}, rowid ASC", direction),
    };
    let filter = if query.status.is_some() {
        " AND status = ?"
    } else {
        ""
    };

    format!(
        "SELECT {} FROM registrations WHERE tournament_id = ?{} ORDER BY {} LIMIT ? OFFSET ?",
        REGISTRATION_COLUMNS, filter, order_by
    )
}

/// Splits a patch field into "was it sent" and the value to store
fn patch<T>(field: Option<Option<T>>) -> (bool, Option<T>) {
    (field.is_some(), field.flatten())
}
