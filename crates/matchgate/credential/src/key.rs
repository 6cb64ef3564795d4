use crate::error::{CredentialError, CredentialResult};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_CONTEXT: &str = "matchgate 2024 credential mac v1";

/// MAC key derived from the shared secret.
///
/// Any trusted producer (e.g. the game server) holding the same secret derives
/// the same key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CredentialKey {
    bytes: [u8; 32],
}

impl CredentialKey {
    pub fn from_secret(secret: &[u8]) -> CredentialResult<Self> {
        if secret.is_empty() {
            return Err(CredentialError::InvalidSecret(
                "secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            bytes: blake3::derive_key(KEY_CONTEXT, secret),
        })
    }

    pub(crate) fn mac(&self, message: &[u8]) -> blake3::Hash {
        blake3::keyed_hash(&self.bytes, message)
    }

    /// Constant-time MAC check.
    pub(crate) fn verify_mac(&self, message: &[u8], mac: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 32]>::try_from(mac) else {
            return false;
        };
        self.mac(message) == blake3::Hash::from(bytes)
    }
}

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CredentialKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            CredentialKey::from_secret(b""),
            Err(CredentialError::InvalidSecret(_))
        ));
    }

    #[test]
    fn same_secret_same_mac() {
        let a = CredentialKey::from_secret(b"secret").unwrap();
        let b = CredentialKey::from_secret(b"secret").unwrap();
        let mac = a.mac(b"claims");
        assert!(b.verify_mac(b"claims", mac.as_bytes()));
    }

    #[test]
    fn different_secret_or_message_fails() {
        let a = CredentialKey::from_secret(b"secret").unwrap();
        let b = CredentialKey::from_secret(b"other").unwrap();
        let mac = a.mac(b"claims");
        assert!(!b.verify_mac(b"claims", mac.as_bytes()));
        assert!(!a.verify_mac(b"claimz", mac.as_bytes()));
        assert!(!a.verify_mac(b"claims", &mac.as_bytes()[..31]));
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = CredentialKey::from_secret(b"secret").unwrap();
        assert_eq!(format!("{key:?}"), "CredentialKey(<redacted>)");
    }
}
