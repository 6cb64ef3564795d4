use crate::credential::{GameOutcome, SignedCredential};
use crate::ids::{PlayerId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub pid: PlayerId,
    /// The single outstanding match credential, if any.
    pub current_credential: Option<SignedCredential>,
    /// Always finite and integral.
    pub rating: f64,
    pub created_at: DateTime<Utc>,
}

impl PlayerRecord {
    pub fn new(pid: PlayerId, rating: f64, created_at: DateTime<Utc>) -> Self {
        Self {
            pid,
            current_credential: None,
            rating,
            created_at,
        }
    }

    /// Whether the stored credential belongs to `session_id`.
    pub fn holds_session(&self, session_id: SessionId) -> bool {
        self.current_credential
            .as_ref()
            .and_then(SignedCredential::session_id)
            == Some(session_id)
    }

    pub fn whole_rating(&self) -> i64 {
        self.rating as i64
    }
}

/// Finalized match outcome. Insert-once per session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub session_id: SessionId,
    pub players: [PlayerId; 2],
    pub scores: [f64; 2],
    pub recorded_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn from_outcome(
        session_id: SessionId,
        outcome: &GameOutcome,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            players: outcome.players,
            scores: outcome.scores,
            recorded_at,
        }
    }
}

/// Result of an insert-once write.
///
/// `AlreadyExists` is not an error: callers skip once-only side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// New rating for one player, produced by the rating engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub pid: PlayerId,
    pub rating: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, CredentialKind};

    fn match_credential(pid: u64, sid: u64) -> SignedCredential {
        SignedCredential {
            token: format!("token-{sid}"),
            credential: Credential::new(
                CredentialKind::Match {
                    pid: PlayerId(pid),
                    session_id: SessionId(sid),
                    matched: false,
                    rating: Some(1500),
                },
                None,
            ),
        }
    }

    #[test]
    fn holds_session_matches_stored_credential_only() {
        let mut record = PlayerRecord::new(PlayerId(1), 1500.0, Utc::now());
        assert!(!record.holds_session(SessionId(4)));

        record.current_credential = Some(match_credential(1, 4));
        assert!(record.holds_session(SessionId(4)));
        assert!(!record.holds_session(SessionId(5)));
    }

    #[test]
    fn whole_rating_truncates() {
        let mut record = PlayerRecord::new(PlayerId(1), 1500.0, Utc::now());
        record.rating = 1483.0;
        assert_eq!(record.whole_rating(), 1483);
    }

    #[test]
    fn player_record_survives_json() {
        let mut record = PlayerRecord::new(PlayerId(2), 1500.0, Utc::now());
        record.current_credential = Some(match_credential(2, 8));
        let json = serde_json::to_string(&record).unwrap();
        let back: PlayerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
