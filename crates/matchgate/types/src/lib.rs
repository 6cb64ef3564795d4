//! Matchgate shared types.
//!
//! Everything the credential, storage, and daemon crates agree on lives here:
//! - monotonic player and session identifiers
//! - the credential sum type, one variant per issuing phase
//! - ledger records for players and finished matches
//!
//! Types here carry data only. Signing lives in `matchgate-credential`,
//! persistence in `matchgate-storage`.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod credential;
mod ids;
mod records;

pub use credential::{
    Credential, CredentialKind, GameOutcome, Issuer, ParseIssuerError, SignedCredential,
};
pub use ids::{PlayerId, Sequence, SessionId};
pub use records::{InsertOutcome, MatchRecord, PlayerRecord, RatingUpdate};
