//! Wire claims and the token envelope.

use crate::error::{CredentialError, CredentialResult};
use crate::key::CredentialKey;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use matchgate_types::{Credential, CredentialKind, GameOutcome, Issuer, PlayerId, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat claim set as it appears inside a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct WireClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<u64>,
    /// Seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct MatchData {
    matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rating: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GameResultData {
    players: [u64; 2],
    scores: [f64; 2],
}

impl WireClaims {
    pub fn from_credential(credential: &Credential) -> CredentialResult<Self> {
        let exp = credential.expires_at.map(|t| t.timestamp());
        let claims = match &credential.kind {
            CredentialKind::Login { pid } => WireClaims {
                iss: Issuer::Login.as_str().to_string(),
                pid: Some(pid.value()),
                sid: None,
                exp,
                data: Value::Object(Default::default()),
            },
            CredentialKind::Match {
                pid,
                session_id,
                matched,
                rating,
            } => WireClaims {
                iss: Issuer::Match.as_str().to_string(),
                pid: Some(pid.value()),
                sid: Some(session_id.value()),
                exp,
                data: to_value(&MatchData {
                    matched: *matched,
                    rating: *rating,
                })?,
            },
            CredentialKind::GameResult {
                pid,
                session_id,
                outcome,
            } => WireClaims {
                iss: Issuer::GameServer.as_str().to_string(),
                pid: Some(pid.value()),
                sid: Some(session_id.value()),
                exp,
                data: to_value(&GameResultData {
                    players: [outcome.players[0].value(), outcome.players[1].value()],
                    scores: outcome.scores,
                })?,
            },
        };
        Ok(claims)
    }

    /// Issuer label as a typed value, or `IssuerMismatch` if unknown.
    pub fn issuer(&self, expected: Issuer) -> CredentialResult<Issuer> {
        self.iss
            .parse::<Issuer>()
            .map_err(|_| CredentialError::IssuerMismatch {
                expected,
                found: self.iss.clone(),
            })
    }

    pub fn expires_at(&self) -> CredentialResult<Option<DateTime<Utc>>> {
        match self.exp {
            None => Ok(None),
            Some(secs) => DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| malformed("exp out of range")),
        }
    }

    /// Convert into the typed credential, enforcing the issuer's shape.
    pub fn into_credential(self, issuer: Issuer) -> CredentialResult<Credential> {
        let expires_at = self.expires_at()?;
        let pid = PlayerId(self.pid.ok_or_else(|| malformed("missing pid"))?);
        let kind = match issuer {
            Issuer::Login => {
                if !self.data.is_object() && !self.data.is_null() {
                    return Err(malformed("login data must be an object"));
                }
                CredentialKind::Login { pid }
            }
            Issuer::Match => {
                let session_id = SessionId(self.sid.ok_or_else(|| malformed("missing sid"))?);
                let data: MatchData = serde_json::from_value(self.data)
                    .map_err(|e| malformed(&format!("match data: {e}")))?;
                CredentialKind::Match {
                    pid,
                    session_id,
                    matched: data.matched,
                    rating: data.rating,
                }
            }
            Issuer::GameServer => {
                let session_id = SessionId(self.sid.ok_or_else(|| malformed("missing sid"))?);
                let data: GameResultData = serde_json::from_value(self.data)
                    .map_err(|e| malformed(&format!("game result data: {e}")))?;
                CredentialKind::GameResult {
                    pid,
                    session_id,
                    outcome: GameOutcome::new(
                        [PlayerId(data.players[0]), PlayerId(data.players[1])],
                        data.scores,
                    ),
                }
            }
        };
        let credential = Credential::new(kind, expires_at);
        check_shape(&credential)?;
        Ok(credential)
    }
}

/// Shape predicates beyond what the field types already enforce.
pub(crate) fn check_shape(credential: &Credential) -> CredentialResult<()> {
    let issuer = credential.issuer();
    if issuer != Issuer::Login && credential.expires_at.is_none() {
        return Err(malformed("missing exp"));
    }
    if let CredentialKind::GameResult { pid, outcome, .. } = &credential.kind {
        if outcome.players[0] == outcome.players[1] {
            return Err(malformed("players must be distinct"));
        }
        if !outcome.scores.iter().all(|s| s.is_finite()) {
            return Err(malformed("scores must be finite"));
        }
        if !outcome.involves(*pid) {
            return Err(malformed("subject is not a player in this match"));
        }
    }
    Ok(())
}

/// Encode and MAC a claim set into a token.
pub(crate) fn seal(key: &CredentialKey, claims: &WireClaims) -> CredentialResult<String> {
    let json = serde_json::to_vec(claims).map_err(|e| CredentialError::Encoding(e.to_string()))?;
    Ok(seal_bytes(key, &json))
}

pub(crate) fn seal_bytes(key: &CredentialKey, claims_json: &[u8]) -> String {
    let body = URL_SAFE_NO_PAD.encode(claims_json);
    let mac = key.mac(body.as_bytes());
    format!("{body}.{}", URL_SAFE_NO_PAD.encode(mac.as_bytes()))
}

/// Check the MAC and decode the claims. Anything structurally off before the
/// MAC is checked counts as a bad signature.
pub(crate) fn open(key: &CredentialKey, token: &str) -> CredentialResult<WireClaims> {
    let (body, mac) = token
        .split_once('.')
        .ok_or(CredentialError::SignatureInvalid)?;
    let mac = URL_SAFE_NO_PAD
        .decode(mac)
        .map_err(|_| CredentialError::SignatureInvalid)?;
    if !key.verify_mac(body.as_bytes(), &mac) {
        return Err(CredentialError::SignatureInvalid);
    }
    let json = URL_SAFE_NO_PAD
        .decode(body)
        .map_err(|e| malformed(&format!("claims encoding: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| malformed(&format!("claims: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> CredentialResult<Value> {
    serde_json::to_value(value).map_err(|e| CredentialError::Encoding(e.to_string()))
}

fn malformed(msg: &str) -> CredentialError {
    CredentialError::MalformedPayload(msg.to_string())
}
