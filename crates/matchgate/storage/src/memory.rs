//! In-memory reference implementation of the matchgate ledgers.
//!
//! Deterministic and test-friendly, but nothing survives a restart. Lock order
//! is counters -> matches -> players everywhere.

use crate::traits::{check_rating, CounterStore, MatchLedger, PlayerLedger};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use matchgate_types::{
    InsertOutcome, MatchRecord, PlayerId, PlayerRecord, RatingUpdate, Sequence, SessionId,
    SignedCredential,
};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// In-memory matchgate store.
pub struct InMemoryStore {
    counters: Mutex<HashMap<Sequence, u64>>,
    matches: RwLock<HashMap<SessionId, MatchRecord>>,
    players: RwLock<HashMap<PlayerId, PlayerRecord>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_session_offset(0)
    }

    /// Start the session sequence at `offset` instead of zero.
    pub fn with_session_offset(offset: u64) -> Self {
        let counters = HashMap::from([(Sequence::Player, 0), (Sequence::Session, offset)]);
        Self {
            counters: Mutex::new(counters),
            matches: RwLock::new(HashMap::new()),
            players: RwLock::new(HashMap::new()),
        }
    }
}

fn poisoned(what: &str) -> StorageError {
    StorageError::Backend(format!("{what} lock poisoned"))
}

fn player_not_found(pid: PlayerId) -> StorageError {
    StorageError::NotFound(format!("player {pid} not found"))
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn next(&self, sequence: Sequence) -> StorageResult<u64> {
        let mut guard = self.counters.lock().map_err(|_| poisoned("counters"))?;
        let slot = guard.entry(sequence).or_insert(0);
        let value = *slot;
        *slot = value
            .checked_add(1)
            .ok_or_else(|| StorageError::Conflict(format!("{sequence} exhausted")))?;
        Ok(value)
    }

    async fn peek(&self, sequence: Sequence) -> StorageResult<u64> {
        let guard = self.counters.lock().map_err(|_| poisoned("counters"))?;
        Ok(guard.get(&sequence).copied().unwrap_or(0))
    }
}

#[async_trait]
impl PlayerLedger for InMemoryStore {
    async fn create_player(&self, initial_rating: f64) -> StorageResult<PlayerId> {
        let mut counters = self.counters.lock().map_err(|_| poisoned("counters"))?;
        let mut players = self.players.write().map_err(|_| poisoned("players"))?;

        let slot = counters.entry(Sequence::Player).or_insert(0);
        let pid = PlayerId(*slot);
        check_rating(pid, initial_rating)?;
        if players.contains_key(&pid) {
            return Err(StorageError::Conflict(format!("player {pid} already exists")));
        }
        *slot += 1;
        players.insert(pid, PlayerRecord::new(pid, initial_rating, Utc::now()));
        Ok(pid)
    }

    async fn get_player(&self, pid: PlayerId) -> StorageResult<PlayerRecord> {
        let players = self.players.read().map_err(|_| poisoned("players"))?;
        players.get(&pid).cloned().ok_or_else(|| player_not_found(pid))
    }

    async fn set_credential(
        &self,
        pid: PlayerId,
        credential: SignedCredential,
    ) -> StorageResult<()> {
        let mut players = self.players.write().map_err(|_| poisoned("players"))?;
        let record = players.get_mut(&pid).ok_or_else(|| player_not_found(pid))?;
        record.current_credential = Some(credential);
        Ok(())
    }

    async fn clear_credential(&self, pid: PlayerId) -> StorageResult<()> {
        let mut players = self.players.write().map_err(|_| poisoned("players"))?;
        let record = players.get_mut(&pid).ok_or_else(|| player_not_found(pid))?;
        record.current_credential = None;
        Ok(())
    }

    async fn apply_rating_delta(&self, pid: PlayerId, new_rating: f64) -> StorageResult<()> {
        check_rating(pid, new_rating)?;
        let mut players = self.players.write().map_err(|_| poisoned("players"))?;
        let record = players.get_mut(&pid).ok_or_else(|| player_not_found(pid))?;
        record.rating = new_rating;
        Ok(())
    }

    async fn player_count(&self) -> StorageResult<u64> {
        let players = self.players.read().map_err(|_| poisoned("players"))?;
        Ok(players.len() as u64)
    }
}

#[async_trait]
impl MatchLedger for InMemoryStore {
    async fn insert_if_absent(&self, record: MatchRecord) -> StorageResult<InsertOutcome> {
        let mut matches = self.matches.write().map_err(|_| poisoned("matches"))?;
        if matches.contains_key(&record.session_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        matches.insert(record.session_id, record);
        Ok(InsertOutcome::Inserted)
    }

    async fn get_match(&self, session_id: SessionId) -> StorageResult<Option<MatchRecord>> {
        let matches = self.matches.read().map_err(|_| poisoned("matches"))?;
        Ok(matches.get(&session_id).cloned())
    }

    async fn settle_match(
        &self,
        record: MatchRecord,
        updates: [RatingUpdate; 2],
    ) -> StorageResult<InsertOutcome> {
        let mut matches = self.matches.write().map_err(|_| poisoned("matches"))?;
        let mut players = self.players.write().map_err(|_| poisoned("players"))?;

        if matches.contains_key(&record.session_id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        // Validate everything before the first write.
        for update in &updates {
            check_rating(update.pid, update.rating)?;
            if !players.contains_key(&update.pid) {
                return Err(player_not_found(update.pid));
            }
        }
        for update in &updates {
            if let Some(player) = players.get_mut(&update.pid) {
                player.rating = update.rating;
            }
        }
        matches.insert(record.session_id, record);
        Ok(InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matchgate_types::{Credential, CredentialKind};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn record(sid: u64, a: u64, b: u64) -> MatchRecord {
        MatchRecord {
            session_id: SessionId(sid),
            players: [PlayerId(a), PlayerId(b)],
            scores: [1.0, 0.0],
            recorded_at: Utc::now(),
        }
    }

    fn updates(a: u64, ra: f64, b: u64, rb: f64) -> [RatingUpdate; 2] {
        [
            RatingUpdate {
                pid: PlayerId(a),
                rating: ra,
            },
            RatingUpdate {
                pid: PlayerId(b),
                rating: rb,
            },
        ]
    }

    #[tokio::test]
    async fn counters_start_at_seed_and_never_repeat() {
        let store = InMemoryStore::with_session_offset(100);
        assert_eq!(store.next(Sequence::Session).await.unwrap(), 100);
        assert_eq!(store.next(Sequence::Session).await.unwrap(), 101);
        assert_eq!(store.peek(Sequence::Session).await.unwrap(), 102);
        assert_eq!(store.peek(Sequence::Player).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_create_player_yields_unique_ids() {
        let store = Arc::new(InMemoryStore::new());
        let tasks = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create_player(1500.0).await.unwrap() })
            })
            .collect::<Vec<_>>();

        let mut seen = HashSet::new();
        for task in futures::future::join_all(tasks).await {
            assert!(seen.insert(task.unwrap()));
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(store.player_count().await.unwrap(), 64);
    }

    #[tokio::test]
    async fn new_player_has_seed_rating_and_no_credential() {
        let store = InMemoryStore::new();
        let pid = store.create_player(1500.0).await.unwrap();
        let player = store.get_player(pid).await.unwrap();
        assert_eq!(player.rating, 1500.0);
        assert!(player.current_credential.is_none());
    }

    #[tokio::test]
    async fn credential_set_and_clear() {
        let store = InMemoryStore::new();
        let pid = store.create_player(1500.0).await.unwrap();
        let signed = SignedCredential {
            token: "t".to_string(),
            credential: Credential::new(
                CredentialKind::Match {
                    pid,
                    session_id: SessionId(3),
                    matched: false,
                    rating: None,
                },
                None,
            ),
        };
        store.set_credential(pid, signed.clone()).await.unwrap();
        assert_eq!(
            store.get_player(pid).await.unwrap().current_credential,
            Some(signed)
        );
        store.clear_credential(pid).await.unwrap();
        assert!(store
            .get_player(pid)
            .await
            .unwrap()
            .current_credential
            .is_none());
    }

    #[tokio::test]
    async fn unknown_player_is_not_found() {
        let store = InMemoryStore::new();
        assert!(store.get_player(PlayerId(9)).await.unwrap_err().is_not_found());
        assert!(store
            .clear_credential(PlayerId(9))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store
            .apply_rating_delta(PlayerId(9), 1400.0)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn non_finite_rating_is_rejected() {
        let store = InMemoryStore::new();
        let pid = store.create_player(1500.0).await.unwrap();
        assert!(matches!(
            store.apply_rating_delta(pid, f64::NAN).await,
            Err(StorageError::InvalidInput(_))
        ));
        assert_eq!(store.get_player(pid).await.unwrap().rating, 1500.0);
    }

    #[tokio::test]
    async fn insert_if_absent_is_insert_once() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.insert_if_absent(record(1, 0, 1)).await.unwrap(),
            InsertOutcome::Inserted
        );
        let mut second = record(1, 0, 1);
        second.scores = [0.0, 1.0];
        assert_eq!(
            store.insert_if_absent(second).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
        let stored = store.get_match(SessionId(1)).await.unwrap().unwrap();
        assert_eq!(stored.scores, [1.0, 0.0]);
    }

    #[tokio::test]
    async fn settle_applies_ratings_once() {
        let store = InMemoryStore::new();
        let a = store.create_player(1500.0).await.unwrap();
        let b = store.create_player(1500.0).await.unwrap();

        let first = store
            .settle_match(record(5, a.0, b.0), updates(a.0, 1516.0, b.0, 1484.0))
            .await
            .unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        let second = store
            .settle_match(record(5, a.0, b.0), updates(a.0, 1530.0, b.0, 1470.0))
            .await
            .unwrap();
        assert_eq!(second, InsertOutcome::AlreadyExists);
        assert_eq!(store.get_player(a).await.unwrap().rating, 1516.0);
        assert_eq!(store.get_player(b).await.unwrap().rating, 1484.0);
    }

    #[tokio::test]
    async fn settle_with_unknown_player_writes_nothing() {
        let store = InMemoryStore::new();
        let a = store.create_player(1500.0).await.unwrap();

        let err = store
            .settle_match(record(6, a.0, 99), updates(a.0, 1516.0, 99, 1484.0))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(store.get_match(SessionId(6)).await.unwrap().is_none());
        assert_eq!(store.get_player(a).await.unwrap().rating, 1500.0);
    }
}
