//! # cov-manifest
//!
//! Signed, time-bounded execution manifests for Covenant.
//!
//! Before any autonomous action runs, the [`ManifestService`] issues a
//! [`SignedManifest`]: the objective (with its hash), the autonomy ceiling,
//! the vault and capability scopes, a random nonce, and a 15-minute expiry,
//! all signed by the installation's identity. Validation never fails with an
//! error; it returns a [`Validation`] carrying a [`RejectReason`] so callers
//! can decide between reissuing and escalating.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cov_identity::IdentityAuthority;
//! use cov_manifest::{AutonomyLevel, ManifestRequest, ManifestService, ManifestServiceConfig};
//!
//! let identity = Arc::new(IdentityAuthority::ephemeral());
//! identity.ensure_identity().unwrap();
//! let service = ManifestService::new(identity, ManifestServiceConfig::default());
//!
//! let signed = service
//!     .create(ManifestRequest::new("summarize inbox", AutonomyLevel::Restricted)
//!         .with_capability("gmail.read"))
//!     .unwrap();
//! assert!(service.validate(&signed).is_valid());
//! ```

pub mod error;
pub mod fingerprint;
pub mod manifest;
pub mod service;

pub use error::ManifestError;
pub use manifest::{
    AutonomyLevel, ExecutionManifest, ManifestObjective, SignedManifest, MANIFEST_VERSION,
};
pub use service::{
    validate_manifest_at, Disposition, ManifestRequest, ManifestService, ManifestServiceConfig,
    RejectReason, Validation, DEFAULT_TTL_MINUTES,
};
