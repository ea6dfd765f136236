//! # cov-identity
//!
//! Signing identity for Covenant.
//!
//! The [`IdentityAuthority`] owns one Ed25519 keypair per installation,
//! persists it in a [`Keystore`], and is the only component that can produce
//! signatures. Manifests and ledger entries are signed over the output of
//! [`canonical::canonicalize`], so every party hashes and verifies identical
//! bytes for logically identical data.
//!
//! ## Quick Example
//!
//! ```rust
//! use cov_identity::IdentityAuthority;
//!
//! let authority = IdentityAuthority::ephemeral();
//! let public = authority.ensure_identity().unwrap();
//! let signature = authority.sign(b"hello").unwrap();
//! assert!(authority.verify(b"hello", &signature, &public));
//! ```

pub mod authority;
pub mod canonical;
pub mod error;
pub mod hasher;
pub mod keystore;

pub use authority::{verify_signature, IdentityAuthority, PublicIdentity, Signature};
pub use canonical::{canonical_bytes, canonicalize};
pub use error::IdentityError;
pub use keystore::Keystore;
