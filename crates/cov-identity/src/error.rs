// error.rs: Error types for the identity subsystem.
//
// Uses `thiserror` to derive the standard Rust `Error` trait automatically.
// `Unavailable` is the only fatal condition in the authorization core: without
// key material nothing can be signed.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during identity and signing operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No key material is loaded; signing is impossible.
    #[error("identity unavailable: no signing key material is loaded")]
    Unavailable,

    /// A keystore file could not be read or written.
    #[error("keystore I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The keystore already holds key material and the caller asked not to replace it.
    #[error("refusing to overwrite existing key material at {path}")]
    AlreadyExists { path: PathBuf },

    /// The stored private key is not a valid PKCS#8 Ed25519 document.
    #[error("malformed key material at {path}: {reason}")]
    MalformedKey { path: PathBuf, reason: String },

    /// The platform random source failed during key generation.
    #[error("key generation failed: system random source unavailable")]
    KeyGeneration,

    /// Failed to serialize a value for canonicalization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A lock guarding key state was poisoned by a panicking thread.
    #[error("identity state lock poisoned: {0}")]
    LockPoisoned(String),
}
