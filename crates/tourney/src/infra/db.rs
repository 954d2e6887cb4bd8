use crate::config::{DBSettings, SqliteSettings};
use log::debug;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{future::Future, time::Duration as StdDuration};
use time::{
    format_description::{well_known::Rfc3339, FormatItem},
    macros::format_description,
    OffsetDateTime, UtcOffset,
};

/// Fixed width RFC 3339 so stored timestamps sort lexically
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteMode {
    ReadWriteCreate, // rwc - Read + Write + Create if missing
    ReadWrite,       // rw  - Read + Write (must exist)
    ReadOnly,        // ro  - Read only (must exist)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    fn pragma(&self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
}

impl SynchronousMode {
    fn pragma(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub mode: SqliteMode,
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
    pub wal_autocheckpoint: Option<u32>,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            mode: SqliteMode::ReadWriteCreate,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
            cache_size: 100000,
            wal_autocheckpoint: Some(1000),
        }
    }
}

impl SqliteConfig {
    pub fn read_only(&self) -> Self {
        Self {
            mode: SqliteMode::ReadOnly,
            synchronous: SynchronousMode::Off, // No writes, so sync doesn't matter
            ..self.clone()
        }
    }

    pub fn build_connect_options(&self, database_path: &str) -> SqliteConnectOptions {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64));

        if self.mode == SqliteMode::ReadOnly {
            // journal mode is owned by the writer, readers only follow it
            return options.read_only(true);
        }

        let mut options = options
            .read_only(false)
            .create_if_missing(self.mode == SqliteMode::ReadWriteCreate)
            // registrations cascade with their tournament
            .foreign_keys(true)
            .pragma("journal_mode", self.journal_mode.pragma())
            .pragma("synchronous", self.synchronous.pragma())
            .pragma("cache_size", self.cache_size.to_string());

        if let Some(checkpoint) = self.wal_autocheckpoint {
            options = options.pragma("wal_autocheckpoint", checkpoint.to_string());
        }

        options
    }
}

impl From<SqliteSettings> for SqliteConfig {
    fn from(settings: SqliteSettings) -> Self {
        Self {
            mode: match settings.mode.as_str() {
                "ReadWrite" => SqliteMode::ReadWrite,
                _ => SqliteMode::ReadWriteCreate,
            },
            busy_timeout_ms: settings.busy_timeout_ms,
            journal_mode: match settings.journal_mode.to_uppercase().as_str() {
                "DELETE" => JournalMode::Delete,
                "TRUNCATE" => JournalMode::Truncate,
                "MEMORY" => JournalMode::Memory,
                _ => JournalMode::Wal,
            },
            synchronous: match settings.synchronous.to_uppercase().as_str() {
                "OFF" => SynchronousMode::Off,
                "FULL" => SynchronousMode::Full,
                _ => SynchronousMode::Normal,
            },
            cache_size: settings.cache_size,
            wal_autocheckpoint: settings.wal_autocheckpoint,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub read_min_connections: u32,
    pub write_max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            read_max_connections: 8,
            read_min_connections: 1,
            write_max_connections: 1, // sqlite has a single writer anyway
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            write_timeout_secs: 30,
            sqlite_config: SqliteConfig::default(),
        }
    }
}

impl From<DBSettings> for DatabasePoolConfig {
    fn from(settings: DBSettings) -> Self {
        Self {
            read_max_connections: settings.read_max_connections,
            read_min_connections: settings.read_min_connections,
            write_max_connections: settings.write_max_connections,
            idle_timeout_secs: settings.idle_timeout_secs,
            acquire_timeout_secs: settings.acquire_timeout_secs,
            write_timeout_secs: settings.write_timeout_secs,
            sqlite_config: settings.sqlite_config.into(),
        }
    }
}

static TOURNAMENTS_MIGRATOR: sqlx::migrate::Migrator =
    sqlx::migrate!("./migrations/tournaments");

#[derive(Debug, thiserror::Error)]
pub enum DatabaseWriteError {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("write did not complete within {0:?}")]
    Timeout(StdDuration),
}

impl From<DatabaseWriteError> for sqlx::Error {
    fn from(error: DatabaseWriteError) -> Self {
        match error {
            DatabaseWriteError::Sqlx(e) => e,
            DatabaseWriteError::Timeout(_) => sqlx::Error::PoolTimedOut,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_name: String,
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
    write_timeout: StdDuration,
}

impl DBConnection {
    pub async fn new(
        path: &str,
        db_name: &str,
        database_pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", path, db_name);

        let database_url = format!("sqlite:{}", database_path);
        if !Sqlite::database_exists(&database_url).await? {
            Sqlite::create_database(&database_url).await?;
        }

        let write_pool = Self::create_write_pool(&database_path, &database_pool_config).await?;

        TOURNAMENTS_MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        // readers open after migrations so the WAL files already exist
        let read_pool = Self::create_read_pool(&database_path, &database_pool_config).await?;

        Ok(Self {
            database_name: db_name.to_string(),
            database_path,
            read_pool,
            write_pool,
            write_timeout: StdDuration::from_secs(database_pool_config.write_timeout_secs),
        })
    }

    /// Wrap already migrated pools, used by `#[sqlx::test]` fixtures.
    pub fn new_with_pools(
        database_name: String,
        database_path: String,
        read_pool: SqlitePool,
        write_pool: SqlitePool,
    ) -> Self {
        Self {
            database_name,
            database_path,
            read_pool,
            write_pool,
            write_timeout: StdDuration::from_secs(30),
        }
    }

    async fn create_write_pool(
        database_path: &str,
        config: &DatabasePoolConfig,
    ) -> Result<SqlitePool, sqlx::Error> {
        let write_connection = config.sqlite_config.build_connect_options(database_path);
        debug!("Write connection: {:?}", write_connection);

        SqlitePoolOptions::new()
            .max_connections(config.write_max_connections)
            .min_connections(1)
            .acquire_timeout(StdDuration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(config.idle_timeout_secs))
            .connect_with(write_connection)
            .await
    }

    async fn create_read_pool(
        database_path: &str,
        config: &DatabasePoolConfig,
    ) -> Result<SqlitePool, sqlx::Error> {
        let read_connection = config
            .sqlite_config
            .read_only()
            .build_connect_options(database_path);
        debug!("Read connection: {:?}", read_connection);

        SqlitePoolOptions::new()
            .max_connections(config.read_max_connections)
            .min_connections(config.read_min_connections)
            .acquire_timeout(StdDuration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(config.idle_timeout_secs))
            .connect_with(read_connection)
            .await
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    /// Run a write against the writer pool, bounded by the configured timeout.
    pub async fn execute_write<F, Fut, T>(&self, operation: F) -> Result<T, DatabaseWriteError>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.write_timeout, operation(self.write_pool.clone())).await {
            Ok(result) => result.map_err(DatabaseWriteError::Sqlx),
            Err(_) => Err(DatabaseWriteError::Timeout(self.write_timeout)),
        }
    }
}

pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_error) if db_error.is_unique_violation())
}

pub fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, sqlx::Error> {
    timestamp
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

pub fn format_optional_timestamp(
    timestamp: Option<OffsetDateTime>,
) -> Result<Option<String>, sqlx::Error> {
    timestamp.map(format_timestamp).transpose()
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

pub fn parse_optional_blob_json<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: serde::de::DeserializeOwned,
{
    let bytes: Option<Vec<u8>> = row.try_get(column)?;
    match bytes {
        Some(data) => {
            let parsed = serde_json::from_slice(&data).map_err(|e| sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(e),
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Decode a text column through `FromStr`, e.g. uuids and status names.
pub fn parse_required_text<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value: String = row.try_get(column)?;
    value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_text<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.try_get::<Option<String>, _>(column)?
        .map(|value| value.parse::<T>())
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}
