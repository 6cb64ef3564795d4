use crate::ids::{PlayerId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The phase (authority) that minted a credential.
///
/// Verification is always scoped to one issuer, so a credential minted for
/// one phase is never accepted by an endpoint expecting another, even though
/// every phase signs with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issuer {
    /// Minted on signup; proves ownership of a player id.
    Login,
    /// Minted on login; binds a player to a match session.
    Match,
    /// Minted by a trusted game server once a match is decided.
    GameServer,
}

impl Issuer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Issuer::Login => "login",
            Issuer::Match => "match",
            Issuer::GameServer => "game_server",
        }
    }
}

impl fmt::Display for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown issuer: {0}")]
pub struct ParseIssuerError(pub String);

impl FromStr for Issuer {
    type Err = ParseIssuerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(Issuer::Login),
            "match" => Ok(Issuer::Match),
            "game_server" => Ok(Issuer::GameServer),
            other => Err(ParseIssuerError(other.to_string())),
        }
    }
}

/// A decided match as reported by the game server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOutcome {
    pub players: [PlayerId; 2],
    pub scores: [f64; 2],
}

impl GameOutcome {
    pub fn new(players: [PlayerId; 2], scores: [f64; 2]) -> Self {
        Self { players, scores }
    }

    pub fn involves(&self, pid: PlayerId) -> bool {
        self.players.contains(&pid)
    }
}

/// Credential body, one variant per issuer.
///
/// Each variant carries exactly the fields its phase needs, so a verified
/// credential never has to be shape-checked again downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CredentialKind {
    Login {
        pid: PlayerId,
    },
    Match {
        pid: PlayerId,
        session_id: SessionId,
        matched: bool,
        /// Rating at issuance, for the pairing service.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rating: Option<i64>,
    },
    GameResult {
        pid: PlayerId,
        session_id: SessionId,
        outcome: GameOutcome,
    },
}

impl CredentialKind {
    pub fn issuer(&self) -> Issuer {
        match self {
            CredentialKind::Login { .. } => Issuer::Login,
            CredentialKind::Match { .. } => Issuer::Match,
            CredentialKind::GameResult { .. } => Issuer::GameServer,
        }
    }

    pub fn subject_pid(&self) -> PlayerId {
        match self {
            CredentialKind::Login { pid }
            | CredentialKind::Match { pid, .. }
            | CredentialKind::GameResult { pid, .. } => *pid,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            CredentialKind::Login { .. } => None,
            CredentialKind::Match { session_id, .. }
            | CredentialKind::GameResult { session_id, .. } => Some(*session_id),
        }
    }
}

/// Decoded, verified credential contents. Immutable once minted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub kind: CredentialKind,
    /// Absolute expiry, whole seconds. `None` means no expiry.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(kind: CredentialKind, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { kind, expires_at }
    }

    pub fn issuer(&self) -> Issuer {
        self.kind.issuer()
    }

    pub fn subject_pid(&self) -> PlayerId {
        self.kind.subject_pid()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.kind.session_id()
    }

    /// Expired once `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(exp) => now > exp,
            None => false,
        }
    }
}

/// A credential together with the signed token it was encoded to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedCredential {
    pub token: String,
    pub credential: Credential,
}

impl SignedCredential {
    pub fn session_id(&self) -> Option<SessionId> {
        self.credential.session_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn issuer_round_trips_through_str() {
        for issuer in [Issuer::Login, Issuer::Match, Issuer::GameServer] {
            assert_eq!(issuer.as_str().parse::<Issuer>().unwrap(), issuer);
        }
        assert!("tic_tac_toe_auth".parse::<Issuer>().is_err());
    }

    #[test]
    fn kind_reports_issuer_and_subject() {
        let kind = CredentialKind::GameResult {
            pid: PlayerId(3),
            session_id: SessionId(9),
            outcome: GameOutcome::new([PlayerId(3), PlayerId(4)], [1.0, 0.0]),
        };
        assert_eq!(kind.issuer(), Issuer::GameServer);
        assert_eq!(kind.subject_pid(), PlayerId(3));
        assert_eq!(kind.session_id(), Some(SessionId(9)));

        let login = CredentialKind::Login { pid: PlayerId(1) };
        assert_eq!(login.session_id(), None);
    }

    #[test]
    fn expiry_is_strict() {
        let now = Utc::now();
        let cred = Credential::new(CredentialKind::Login { pid: PlayerId(1) }, Some(now));
        assert!(!cred.is_expired_at(now));
        assert!(cred.is_expired_at(now + Duration::seconds(1)));

        let forever = Credential::new(CredentialKind::Login { pid: PlayerId(1) }, None);
        assert!(!forever.is_expired_at(now + Duration::days(3650)));
    }

    #[test]
    fn outcome_involves_listed_players_only() {
        let outcome = GameOutcome::new([PlayerId(1), PlayerId(2)], [0.5, 0.5]);
        assert!(outcome.involves(PlayerId(2)));
        assert!(!outcome.involves(PlayerId(5)));
    }
}
