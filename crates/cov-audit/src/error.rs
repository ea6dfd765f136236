// error.rs: Error types for the audit ledger.
//
// Integrity failures are not errors: `verify_chain` reports them as a
// `ChainReport`. These variants cover the ledger being unable to do its job
// at all (storage, signing, corrupt files).

use std::path::PathBuf;

use cov_identity::IdentityError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Failed to open or create the ledger file.
    #[error("failed to open ledger at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an entry to the ledger file.
    #[error("failed to append entry: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to serialize or deserialize an entry.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A line of the ledger file is not a ledger entry.
    #[error("ledger file {path} is unreadable at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Signing the entry failed, most commonly with `IdentityError::Unavailable`.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The ledger state lock was poisoned by a panicking writer.
    #[error("ledger state lock poisoned: {0}")]
    LockPoisoned(String),
}
