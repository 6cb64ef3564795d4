use matchgate_types::Issuer;
use thiserror::Error;

/// Result type for credential operations.
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Credential issuance and verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("signature invalid")]
    SignatureInvalid,

    #[error("issuer mismatch: expected {expected}, found {found}")]
    IssuerMismatch { expected: Issuer, found: String },

    #[error("credential expired")]
    Expired,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{0} credentials require an expiry")]
    MissingExpiry(Issuer),

    #[error("invalid signing secret: {0}")]
    InvalidSecret(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl CredentialError {
    /// Short label for logs. Never sent to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            CredentialError::SignatureInvalid => "signature_invalid",
            CredentialError::IssuerMismatch { .. } => "issuer_mismatch",
            CredentialError::Expired => "expired",
            CredentialError::MalformedPayload(_) => "malformed_payload",
            CredentialError::MissingExpiry(_) => "missing_expiry",
            CredentialError::InvalidSecret(_) => "invalid_secret",
            CredentialError::Encoding(_) => "encoding",
        }
    }
}
