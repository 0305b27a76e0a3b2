use thiserror::Error;

/// Reasons an update attestation is rejected.
///
/// None of these are recoverable by trusting the update anyway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed public key: {0}")]
    MalformedKey(String),

    #[error("the update is not signed by a trusted party: {0}")]
    SignatureInvalid(String),

    #[error("signed token does not carry a '{0}' claim")]
    MissingClaim(&'static str),
}
