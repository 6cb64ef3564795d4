//! Matchgate credential issuer and verifier.
//!
//! A credential token is `base64url(claims) "." base64url(mac)`, where the
//! claims are a JSON object (`iss`, `pid`, `sid`, `exp`, `data`) and the MAC is
//! a keyed BLAKE3 hash of the encoded claims segment under a key derived from
//! the process-wide secret.
//!
//! Verification is always scoped to an expected [`Issuer`]:
//! - a bad or missing MAC fails with `SignatureInvalid`
//! - a valid MAC for another phase fails with `IssuerMismatch`
//! - a passed `exp` fails with `Expired`
//! - a payload that does not fit its phase fails with `MalformedPayload`
//!
//! Callers at a trust boundary must collapse all of these into one failure.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod authority;
mod codec;
mod error;
mod key;

pub use authority::CredentialAuthority;
pub use error::{CredentialError, CredentialResult};
pub use key::CredentialKey;
pub use matchgate_types::{Credential, CredentialKind, Issuer, SignedCredential};
