use crate::codec::{self, WireClaims};
use crate::error::{CredentialError, CredentialResult};
use crate::key::CredentialKey;
use chrono::{DateTime, Duration, Utc};
use matchgate_types::{Credential, CredentialKind, Issuer, SignedCredential};

/// Issues and verifies credentials under one shared secret.
#[derive(Debug, Clone)]
pub struct CredentialAuthority {
    key: CredentialKey,
}

impl CredentialAuthority {
    pub fn new(secret: &[u8]) -> CredentialResult<Self> {
        Ok(Self {
            key: CredentialKey::from_secret(secret)?,
        })
    }

    pub fn from_key(key: CredentialKey) -> Self {
        Self { key }
    }

    /// Mint a credential. `ttl = None` means no expiry and is only allowed
    /// for login credentials.
    pub fn issue(
        &self,
        kind: CredentialKind,
        ttl: Option<Duration>,
    ) -> CredentialResult<SignedCredential> {
        self.issue_at(kind, ttl, Utc::now())
    }

    pub fn issue_at(
        &self,
        kind: CredentialKind,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> CredentialResult<SignedCredential> {
        let issuer = kind.issuer();
        let expires_at = match ttl {
            Some(ttl) => Some(expiry(now, ttl)?),
            None if issuer == Issuer::Login => None,
            None => return Err(CredentialError::MissingExpiry(issuer)),
        };
        let credential = Credential::new(kind, expires_at);
        codec::check_shape(&credential)?;
        let token = codec::seal(&self.key, &WireClaims::from_credential(&credential)?)?;
        Ok(SignedCredential { token, credential })
    }

    /// Verify a token against the issuer the caller expects.
    pub fn verify(&self, token: &str, expected: Issuer) -> CredentialResult<Credential> {
        self.verify_at(token, expected, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        expected: Issuer,
        now: DateTime<Utc>,
    ) -> CredentialResult<Credential> {
        let claims = codec::open(&self.key, token)?;
        let issuer = claims.issuer(expected)?;
        if issuer != expected {
            return Err(CredentialError::IssuerMismatch {
                expected,
                found: claims.iss,
            });
        }
        if let Some(exp) = claims.expires_at()? {
            if now > exp {
                return Err(CredentialError::Expired);
            }
        }
        claims.into_credential(issuer)
    }

    /// Verify a previously issued credential still holds, returning it intact.
    pub fn reverify(
        &self,
        signed: &SignedCredential,
        expected: Issuer,
    ) -> CredentialResult<SignedCredential> {
        let credential = self.verify(&signed.token, expected)?;
        Ok(SignedCredential {
            token: signed.token.clone(),
            credential,
        })
    }
}

/// Whole-second expiry so a decoded credential equals the minted one.
fn expiry(now: DateTime<Utc>, ttl: Duration) -> CredentialResult<DateTime<Utc>> {
    if ttl <= Duration::zero() {
        return Err(CredentialError::Encoding("ttl must be positive".to_string()));
    }
    DateTime::from_timestamp(now.timestamp().saturating_add(ttl.num_seconds().max(1)), 0)
        .ok_or_else(|| CredentialError::Encoding("expiry out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::seal_bytes;
    use matchgate_types::{GameOutcome, PlayerId, SessionId};
    use proptest::prelude::*;
    use serde_json::json;

    fn authority() -> CredentialAuthority {
        CredentialAuthority::new(b"secret").unwrap()
    }

    fn login(pid: u64) -> CredentialKind {
        CredentialKind::Login { pid: PlayerId(pid) }
    }

    fn match_kind(pid: u64, sid: u64) -> CredentialKind {
        CredentialKind::Match {
            pid: PlayerId(pid),
            session_id: SessionId(sid),
            matched: false,
            rating: Some(1500),
        }
    }

    fn result_kind(pid: u64, sid: u64) -> CredentialKind {
        CredentialKind::GameResult {
            pid: PlayerId(pid),
            session_id: SessionId(sid),
            outcome: GameOutcome::new([PlayerId(pid), PlayerId(pid + 1)], [1.0, 0.0]),
        }
    }

    #[test]
    fn issued_credentials_verify_under_their_issuer() {
        let auth = authority();
        for (kind, issuer) in [
            (login(7), Issuer::Login),
            (match_kind(7, 1), Issuer::Match),
            (result_kind(7, 1), Issuer::GameServer),
        ] {
            let signed = auth.issue(kind, Some(Duration::minutes(5))).unwrap();
            let verified = auth.verify(&signed.token, issuer).unwrap();
            assert_eq!(verified, signed.credential);
        }
    }

    #[test]
    fn login_without_ttl_never_expires() {
        let auth = authority();
        let signed = auth.issue(login(3), None).unwrap();
        assert!(signed.credential.expires_at.is_none());
        let far_future = Utc::now() + Duration::days(365 * 50);
        assert!(auth
            .verify_at(&signed.token, Issuer::Login, far_future)
            .is_ok());
    }

    #[test]
    fn match_and_result_require_ttl() {
        let auth = authority();
        assert_eq!(
            auth.issue(match_kind(1, 1), None),
            Err(CredentialError::MissingExpiry(Issuer::Match))
        );
        assert_eq!(
            auth.issue(result_kind(1, 1), None),
            Err(CredentialError::MissingExpiry(Issuer::GameServer))
        );
    }

    #[test]
    fn wrong_issuer_is_rejected_even_with_valid_signature() {
        let auth = authority();
        let result = auth
            .issue(result_kind(7, 2), Some(Duration::minutes(5)))
            .unwrap();
        assert!(matches!(
            auth.verify(&result.token, Issuer::Login),
            Err(CredentialError::IssuerMismatch { .. })
        ));

        let login = auth.issue(login(7), None).unwrap();
        assert!(matches!(
            auth.verify(&login.token, Issuer::GameServer),
            Err(CredentialError::IssuerMismatch { .. })
        ));
        assert!(matches!(
            auth.verify(&login.token, Issuer::Match),
            Err(CredentialError::IssuerMismatch { .. })
        ));
    }

    #[test]
    fn expired_credentials_are_rejected() {
        let auth = authority();
        let issued_at = Utc::now() - Duration::hours(2);
        let signed = auth
            .issue_at(match_kind(1, 1), Some(Duration::minutes(30)), issued_at)
            .unwrap();
        assert_eq!(
            auth.verify(&signed.token, Issuer::Match),
            Err(CredentialError::Expired)
        );
        let exp = signed.credential.expires_at.unwrap();
        assert!(auth.verify_at(&signed.token, Issuer::Match, exp).is_ok());
    }

    #[test]
    fn other_secret_cannot_verify() {
        let signed = authority().issue(login(1), None).unwrap();
        let other = CredentialAuthority::new(b"not-the-secret").unwrap();
        assert_eq!(
            other.verify(&signed.token, Issuer::Login),
            Err(CredentialError::SignatureInvalid)
        );
    }

    #[test]
    fn issue_refuses_invalid_game_results() {
        let auth = authority();
        let same_player = CredentialKind::GameResult {
            pid: PlayerId(1),
            session_id: SessionId(1),
            outcome: GameOutcome::new([PlayerId(1), PlayerId(1)], [1.0, 0.0]),
        };
        assert!(matches!(
            auth.issue(same_player, Some(Duration::minutes(1))),
            Err(CredentialError::MalformedPayload(_))
        ));

        let outsider = CredentialKind::GameResult {
            pid: PlayerId(9),
            session_id: SessionId(1),
            outcome: GameOutcome::new([PlayerId(1), PlayerId(2)], [1.0, 0.0]),
        };
        assert!(matches!(
            auth.issue(outsider, Some(Duration::minutes(1))),
            Err(CredentialError::MalformedPayload(_))
        ));
    }

    #[test]
    fn signed_but_misshapen_payload_is_malformed() {
        let auth = authority();
        let claims = json!({
            "iss": "game_server",
            "pid": 1,
            "sid": 4,
            "exp": (Utc::now() + Duration::minutes(5)).timestamp(),
            "data": { "players": [1], "scores": [1.0] }
        });
        let token = seal_bytes(&auth.key, claims.to_string().as_bytes());
        assert!(matches!(
            auth.verify(&token, Issuer::GameServer),
            Err(CredentialError::MalformedPayload(_))
        ));
    }

    #[test]
    fn reverify_keeps_token() {
        let auth = authority();
        let signed = auth
            .issue(match_kind(4, 9), Some(Duration::minutes(5)))
            .unwrap();
        let again = auth.reverify(&signed, Issuer::Match).unwrap();
        assert_eq!(again, signed);
    }

    const TOKEN_CHARS: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.";

    proptest! {
        #[test]
        fn any_single_character_change_is_rejected(
            pid in 0u64..1_000_000,
            pos in any::<prop::sample::Index>(),
            replacement in prop::sample::select(TOKEN_CHARS.to_vec()),
        ) {
            let auth = authority();
            let signed = auth.issue(login(pid), None).unwrap();
            let mut bytes = signed.token.clone().into_bytes();
            let idx = pos.index(bytes.len());
            prop_assume!(bytes[idx] != replacement);
            bytes[idx] = replacement;
            let tampered = String::from_utf8(bytes).unwrap();
            prop_assert!(auth.verify(&tampered, Issuer::Login).is_err());
        }
    }
}
