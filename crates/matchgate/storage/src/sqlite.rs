//! SQLite adapter for the matchgate ledgers.
//!
//! Every multi-statement operation runs in one transaction whose first
//! statement is a write, so SQLite takes the write lock up front and a
//! concurrent writer waits on `busy_timeout` instead of failing mid-way.

use crate::traits::{check_rating, CounterStore, MatchLedger, PlayerLedger};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use matchgate_types::{
    InsertOutcome, MatchRecord, PlayerId, PlayerRecord, RatingUpdate, Sequence, SessionId,
    SignedCredential,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed matchgate store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and initialize schema.
    pub async fn connect(url: &str, session_offset: u64) -> StorageResult<Self> {
        Self::connect_with_options(url, 5, 5, session_offset).await
    }

    pub async fn connect_with_options(
        url: &str,
        max_connections: u32,
        busy_timeout_secs: u64,
        session_offset: u64,
    ) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::InvalidInput(format!("bad sqlite url {url}: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(busy_timeout_secs));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to open sqlite: {e}")))?;
        Self::from_pool(pool, session_offset).await
    }

    /// Wrap an existing pool. Counter seeds only apply on first use.
    pub async fn from_pool(pool: SqlitePool, session_offset: u64) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema(session_offset).await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(&self, session_offset: u64) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS counters (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS players (
                pid INTEGER PRIMARY KEY,
                credential TEXT,
                rating REAL NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                session_id INTEGER PRIMARY KEY,
                player_a INTEGER NOT NULL,
                player_b INTEGER NOT NULL,
                score_a REAL NOT NULL,
                score_b REAL NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }

        for (sequence, seed) in [
            (Sequence::Player, 0),
            (Sequence::Session, to_i64(session_offset)?),
        ] {
            sqlx::query("INSERT INTO counters (name, value) VALUES (?1, ?2) ON CONFLICT (name) DO NOTHING")
                .bind(sequence.name())
                .bind(seed)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("counter seed failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn next(&self, sequence: Sequence) -> StorageResult<u64> {
        let row = sqlx::query("UPDATE counters SET value = value + 1 WHERE name = ?1 RETURNING value")
            .bind(sequence.name())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(format!("counter {sequence} not seeded")))?;
        allocated(&row)
    }

    async fn peek(&self, sequence: Sequence) -> StorageResult<u64> {
        let value: i64 = sqlx::query_scalar("SELECT value FROM counters WHERE name = ?1")
            .bind(sequence.name())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(format!("counter {sequence} not seeded")))?;
        to_u64(value)
    }
}

#[async_trait]
impl PlayerLedger for SqliteStore {
    async fn create_player(&self, initial_rating: f64) -> StorageResult<PlayerId> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query("UPDATE counters SET value = value + 1 WHERE name = ?1 RETURNING value")
            .bind(Sequence::Player.name())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound("player counter not seeded".to_string()))?;
        let pid = PlayerId(allocated(&row)?);
        check_rating(pid, initial_rating)?;

        sqlx::query(
            "INSERT INTO players (pid, credential, rating, created_at) VALUES (?1, NULL, ?2, ?3)",
        )
        .bind(to_i64(pid.value())?)
        .bind(initial_rating)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_conflict)?;

        tx.commit().await.map_err(backend)?;
        Ok(pid)
    }

    async fn get_player(&self, pid: PlayerId) -> StorageResult<PlayerRecord> {
        let row = sqlx::query("SELECT pid, credential, rating, created_at FROM players WHERE pid = ?1")
            .bind(to_i64(pid.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| player_not_found(pid))?;
        player_row_to_record(row)
    }

    async fn set_credential(
        &self,
        pid: PlayerId,
        credential: SignedCredential,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(&credential)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let result = sqlx::query("UPDATE players SET credential = ?1 WHERE pid = ?2")
            .bind(json)
            .bind(to_i64(pid.value())?)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        require_row(result.rows_affected(), pid)
    }

    async fn clear_credential(&self, pid: PlayerId) -> StorageResult<()> {
        let result = sqlx::query("UPDATE players SET credential = NULL WHERE pid = ?1")
            .bind(to_i64(pid.value())?)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        require_row(result.rows_affected(), pid)
    }

    async fn apply_rating_delta(&self, pid: PlayerId, new_rating: f64) -> StorageResult<()> {
        check_rating(pid, new_rating)?;
        let result = sqlx::query("UPDATE players SET rating = ?1 WHERE pid = ?2")
            .bind(new_rating)
            .bind(to_i64(pid.value())?)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        require_row(result.rows_affected(), pid)
    }

    async fn player_count(&self) -> StorageResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM players")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        to_u64(count)
    }
}

#[async_trait]
impl MatchLedger for SqliteStore {
    async fn insert_if_absent(&self, record: MatchRecord) -> StorageResult<InsertOutcome> {
        let result = insert_match(&self.pool, &record).await?;
        Ok(outcome(result))
    }

    async fn get_match(&self, session_id: SessionId) -> StorageResult<Option<MatchRecord>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, player_a, player_b, score_a, score_b, recorded_at
              FROM matches
             WHERE session_id = ?1
            "#,
        )
        .bind(to_i64(session_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(match_row_to_record).transpose()
    }

    async fn settle_match(
        &self,
        record: MatchRecord,
        updates: [RatingUpdate; 2],
    ) -> StorageResult<InsertOutcome> {
        for update in &updates {
            check_rating(update.pid, update.rating)?;
        }

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let inserted = insert_match(&mut *tx, &record).await?;
        if inserted == 0 {
            return Ok(InsertOutcome::AlreadyExists);
        }

        for update in &updates {
            let result = sqlx::query("UPDATE players SET rating = ?1 WHERE pid = ?2")
                .bind(update.rating)
                .bind(to_i64(update.pid.value())?)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            // Dropping the transaction rolls back the match insert too.
            require_row(result.rows_affected(), update.pid)?;
        }

        tx.commit().await.map_err(backend)?;
        Ok(InsertOutcome::Inserted)
    }
}

async fn insert_match<'e, E>(executor: E, record: &MatchRecord) -> StorageResult<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO matches (session_id, player_a, player_b, score_a, score_b, recorded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (session_id) DO NOTHING
        "#,
    )
    .bind(to_i64(record.session_id.value())?)
    .bind(to_i64(record.players[0].value())?)
    .bind(to_i64(record.players[1].value())?)
    .bind(record.scores[0])
    .bind(record.scores[1])
    .bind(record.recorded_at)
    .execute(executor)
    .await
    .map_err(backend)?;
    Ok(result.rows_affected())
}

fn outcome(rows_affected: u64) -> InsertOutcome {
    if rows_affected == 0 {
        InsertOutcome::AlreadyExists
    } else {
        InsertOutcome::Inserted
    }
}

fn player_row_to_record(row: SqliteRow) -> StorageResult<PlayerRecord> {
    let pid: i64 = row.try_get("pid").map_err(backend)?;
    let credential: Option<String> = row.try_get("credential").map_err(backend)?;
    let rating: f64 = row.try_get("rating").map_err(backend)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(backend)?;

    let current_credential = credential
        .map(|json| serde_json::from_str::<SignedCredential>(&json))
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(PlayerRecord {
        pid: PlayerId(to_u64(pid)?),
        current_credential,
        rating,
        created_at,
    })
}

fn match_row_to_record(row: SqliteRow) -> StorageResult<MatchRecord> {
    let session_id: i64 = row.try_get("session_id").map_err(backend)?;
    let player_a: i64 = row.try_get("player_a").map_err(backend)?;
    let player_b: i64 = row.try_get("player_b").map_err(backend)?;
    let score_a: f64 = row.try_get("score_a").map_err(backend)?;
    let score_b: f64 = row.try_get("score_b").map_err(backend)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(backend)?;

    Ok(MatchRecord {
        session_id: SessionId(to_u64(session_id)?),
        players: [PlayerId(to_u64(player_a)?), PlayerId(to_u64(player_b)?)],
        scores: [score_a, score_b],
        recorded_at,
    })
}

/// `RETURNING value` yields the post-increment value; the allocation is the one before.
fn allocated(row: &SqliteRow) -> StorageResult<u64> {
    let value: i64 = row.try_get("value").map_err(backend)?;
    to_u64(value - 1)
}

fn require_row(rows_affected: u64, pid: PlayerId) -> StorageResult<()> {
    if rows_affected == 0 {
        Err(player_not_found(pid))
    } else {
        Ok(())
    }
}

fn player_not_found(pid: PlayerId) -> StorageError {
    StorageError::NotFound(format!("player {pid} not found"))
}

fn backend(err: sqlx::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn map_sqlx_conflict(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StorageError::Conflict(db_err.message().to_string());
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidInput(format!("{value} out of range")))
}

fn to_u64(value: i64) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::Serialization(format!("negative id {value}")))
}
