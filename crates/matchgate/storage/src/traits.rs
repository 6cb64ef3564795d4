use crate::StorageResult;
use async_trait::async_trait;
use matchgate_types::{
    InsertOutcome, MatchRecord, PlayerId, PlayerRecord, RatingUpdate, Sequence, SessionId,
    SignedCredential,
};

/// Durable monotonic sequences.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Allocate the next value. No two calls ever return the same value,
    /// including across restarts; gaps are allowed.
    async fn next(&self, sequence: Sequence) -> StorageResult<u64>;

    /// Value the next allocation would return.
    async fn peek(&self, sequence: Sequence) -> StorageResult<u64>;
}

/// Player id -> current credential and rating.
#[async_trait]
pub trait PlayerLedger: Send + Sync {
    /// Allocate a pid and insert its record in one step. The id is only
    /// returned once the record is durable.
    async fn create_player(&self, initial_rating: f64) -> StorageResult<PlayerId>;

    /// Fails with `NotFound` for unknown players.
    async fn get_player(&self, pid: PlayerId) -> StorageResult<PlayerRecord>;

    /// Replace the stored credential unconditionally.
    async fn set_credential(&self, pid: PlayerId, credential: SignedCredential)
        -> StorageResult<()>;

    async fn clear_credential(&self, pid: PlayerId) -> StorageResult<()>;

    /// Persist a new rating. Non-finite ratings are rejected.
    async fn apply_rating_delta(&self, pid: PlayerId, new_rating: f64) -> StorageResult<()>;

    async fn player_count(&self) -> StorageResult<u64>;
}

/// Session id -> finalized match.
#[async_trait]
pub trait MatchLedger: Send + Sync {
    /// The only plain write path. `AlreadyExists` is success-but-skip.
    async fn insert_if_absent(&self, record: MatchRecord) -> StorageResult<InsertOutcome>;

    async fn get_match(&self, session_id: SessionId) -> StorageResult<Option<MatchRecord>>;

    /// Insert the record and, only if it was absent, persist both rating
    /// updates. All-or-nothing: on error nothing is written.
    async fn settle_match(
        &self,
        record: MatchRecord,
        updates: [RatingUpdate; 2],
    ) -> StorageResult<InsertOutcome>;
}

/// Everything the service needs from one backend.
pub trait MatchgateStorage: CounterStore + PlayerLedger + MatchLedger + Send + Sync {}

impl<T> MatchgateStorage for T where T: CounterStore + PlayerLedger + MatchLedger + Send + Sync {}

pub(crate) fn check_rating(pid: PlayerId, rating: f64) -> StorageResult<()> {
    if rating.is_finite() {
        Ok(())
    } else {
        Err(crate::StorageError::InvalidInput(format!(
            "rating for player {pid} must be finite, got {rating}"
        )))
    }
}
