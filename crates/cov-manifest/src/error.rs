// error.rs: Error types for manifest issuance.
//
// Validation failures are not errors: they come back as `Validation` values.
// Only issuance can fail, and in practice only because the identity is
// unavailable.

use cov_identity::IdentityError;
use thiserror::Error;

/// Errors that can occur while issuing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Signing failed, most commonly with `IdentityError::Unavailable`.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Failed to serialize the manifest for canonicalization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The platform random source failed while drawing a nonce.
    #[error("nonce generation failed: system random source unavailable")]
    Randomness,

    /// An autonomy level name did not parse.
    #[error("unknown autonomy level '{0}' (expected RESTRICTED, SEMI_AUTONOMOUS, or SOVEREIGN)")]
    UnknownAutonomyLevel(String),
}
