//! Session service: the five externally visible operations.
//!
//! Every operation is a straight line of verify -> lock -> read -> write.
//! Verification failures are logged with their reason and then collapsed into
//! [`ServiceError::Rejected`].

use crate::config::DaemonConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::locks::KeyedLocks;
use chrono::{Duration, Utc};
use matchgate_credential::{CredentialAuthority, CredentialError};
use matchgate_rating::EloParams;
use matchgate_storage::MatchgateStorage;
use matchgate_types::{
    Credential, CredentialKind, InsertOutcome, Issuer, MatchRecord, PlayerId, Sequence,
    SessionId, SignedCredential,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Tunables the service reads on every request.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub login_ttl: Option<Duration>,
    pub match_ttl: Duration,
    pub elo: EloParams,
    pub initial_rating: f64,
    pub max_players: Option<u64>,
}

impl ServiceSettings {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            login_ttl: config.credentials.login_ttl(),
            match_ttl: config.credentials.match_ttl(),
            elo: EloParams {
                k_factor: config.rating.k_factor,
            },
            initial_rating: config.rating.initial_rating,
            max_players: (config.limits.max_players > 0).then_some(config.limits.max_players),
        }
    }
}

/// Public view of a player for `/info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    pub pid: PlayerId,
    pub rating: i64,
}

/// Issues, validates, and rotates credentials over the player and match ledgers.
pub struct SessionService {
    storage: Arc<dyn MatchgateStorage>,
    authority: CredentialAuthority,
    locks: KeyedLocks<PlayerId>,
    settings: ServiceSettings,
}

impl SessionService {
    pub fn new(
        storage: Arc<dyn MatchgateStorage>,
        authority: CredentialAuthority,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            storage,
            authority,
            locks: KeyedLocks::new(),
            settings,
        }
    }

    pub fn storage(&self) -> &Arc<dyn MatchgateStorage> {
        &self.storage
    }

    /// Allocate a player and mint its login credential.
    pub async fn signup(&self) -> ServiceResult<SignedCredential> {
        if let Some(max) = self.settings.max_players {
            if self.storage.player_count().await? >= max {
                tracing::warn!(max_players = max, "signup refused: player limit reached");
                return Err(ServiceError::Rejected);
            }
        }

        let pid = self.storage.create_player(self.settings.initial_rating).await?;
        let signed = self
            .authority
            .issue(CredentialKind::Login { pid }, self.settings.login_ttl)
            .map_err(ServiceError::Issuance)?;

        info!(%pid, "player signed up");
        Ok(signed)
    }

    /// Return the player's live match credential, or open a new session.
    pub async fn login(&self, token: &str) -> ServiceResult<SignedCredential> {
        let pid = self.verify(token, Issuer::Login, "login")?.subject_pid();

        let _guard = self.locks.lock(pid).await;
        let player = self.storage.get_player(pid).await?;

        if let Some(stored) = &player.current_credential {
            match self.authority.reverify(stored, Issuer::Match) {
                Ok(live) => {
                    debug!(%pid, session_id = ?live.session_id(), "reusing live match credential");
                    return Ok(live);
                }
                Err(err) => {
                    debug!(%pid, reason = err.reason(), "stored match credential lapsed");
                }
            }
        }

        let session_id = SessionId(self.storage.next(Sequence::Session).await?);
        let signed = self
            .authority
            .issue(
                CredentialKind::Match {
                    pid,
                    session_id,
                    matched: false,
                    rating: Some(player.whole_rating()),
                },
                Some(self.settings.match_ttl),
            )
            .map_err(ServiceError::Issuance)?;
        self.storage.set_credential(pid, signed.clone()).await?;

        info!(%pid, %session_id, "match session opened");
        Ok(signed)
    }

    pub async fn info(&self, token: &str) -> ServiceResult<PlayerInfo> {
        let pid = self.verify(token, Issuer::Login, "info")?.subject_pid();
        let player = self.storage.get_player(pid).await?;
        Ok(PlayerInfo {
            pid,
            rating: player.whole_rating(),
        })
    }

    /// Withdraw an unmatched session.
    ///
    /// Only the session the ledger still holds is cleared; cancelling a
    /// superseded session succeeds without touching the newer one.
    pub async fn cancel(&self, token: &str) -> ServiceResult<()> {
        let credential = self.verify(token, Issuer::Match, "cancel")?;
        let CredentialKind::Match {
            pid,
            session_id,
            matched,
            ..
        } = credential.kind
        else {
            return Err(ServiceError::Rejected);
        };
        if matched {
            debug!(%pid, %session_id, "cancel refused: session already matched");
            return Err(ServiceError::Rejected);
        }

        let _guard = self.locks.lock(pid).await;
        let player = self.storage.get_player(pid).await?;
        if player.holds_session(session_id) {
            self.storage.clear_credential(pid).await?;
            info!(%pid, %session_id, "match session cancelled");
        } else {
            debug!(%pid, %session_id, "cancel for superseded session ignored");
        }
        Ok(())
    }

    /// Record a finished match and apply its rating change exactly once.
    ///
    /// Duplicate submissions for the same session return
    /// [`InsertOutcome::AlreadyExists`] and change nothing.
    pub async fn submit(&self, token: &str) -> ServiceResult<InsertOutcome> {
        let credential = self.verify(token, Issuer::GameServer, "submit")?;
        let CredentialKind::GameResult {
            pid,
            session_id,
            outcome,
        } = credential.kind
        else {
            return Err(ServiceError::Rejected);
        };

        // The subject is one of the two players, so this covers it too.
        let _guards = self
            .locks
            .lock_pair(outcome.players[0], outcome.players[1])
            .await;

        let result = match self.storage.get_match(session_id).await? {
            Some(_) => InsertOutcome::AlreadyExists,
            None => {
                let first = self.storage.get_player(outcome.players[0]).await?;
                let second = self.storage.get_player(outcome.players[1]).await?;
                let updates =
                    matchgate_rating::settle(&outcome, [first.rating, second.rating], self.settings.elo);
                // Non-finite ratings can never be persisted.
                if updates.iter().any(|u| !u.rating.is_finite()) {
                    debug!(%session_id, scores = ?outcome.scores, "result rejected: rating overflow");
                    return Err(ServiceError::Rejected);
                }
                let record = MatchRecord::from_outcome(session_id, &outcome, Utc::now());
                let result = self.storage.settle_match(record, updates).await?;
                if result.is_inserted() {
                    info!(
                        %session_id,
                        players = ?outcome.players,
                        scores = ?outcome.scores,
                        ratings = ?[updates[0].rating, updates[1].rating],
                        "match settled"
                    );
                }
                result
            }
        };
        if !result.is_inserted() {
            debug!(%session_id, "duplicate result submission skipped");
        }

        // Cleared last so a failed settlement leaves the session intact.
        let subject = self.storage.get_player(pid).await?;
        if subject.holds_session(session_id) {
            self.storage.clear_credential(pid).await?;
        }
        Ok(result)
    }

    fn verify(&self, token: &str, expected: Issuer, op: &'static str) -> ServiceResult<Credential> {
        self.authority.verify(token, expected).map_err(|err: CredentialError| {
            debug!(op, reason = err.reason(), detail = %err, "credential rejected");
            ServiceError::Rejected
        })
    }
}
