// service.rs: ManifestService, which issues and validates signed manifests.
//
// Issuance:
//   1. hash the objective
//   2. stamp created_at = now, expires_at = now + ttl (15 minutes by default)
//   3. draw a fresh nonce and a time-ordered execution id
//   4. canonicalize and sign
//
// Validation checks, in order, stopping at the first failure:
//   1. expiry            → Expired
//   2. objective hash    → Tampered
//   3. signature         → SignatureInvalid
//
// The TTL bounds replay. There is no grace window for clock skew: a
// manifest one second past `expires_at` is rejected.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use cov_identity::{verify_signature, IdentityAuthority, PublicIdentity};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ManifestError;
use crate::fingerprint;
use crate::manifest::{
    AutonomyLevel, ExecutionManifest, ManifestObjective, ManifestParts, SignedManifest,
};

/// Default manifest lifetime.
pub const DEFAULT_TTL_MINUTES: i64 = 15;

/// Nonce length in bytes (hex-encoded to twice this in the manifest).
pub const NONCE_LEN: usize = 32;

/// Issuance settings shared by every manifest from one service.
#[derive(Debug, Clone)]
pub struct ManifestServiceConfig {
    /// How long a manifest stays valid after issuance.
    pub ttl: Duration,
    /// Version tag of the planner that produced the objective.
    pub planner_version: String,
    /// Version tag of the model backing the planner.
    pub model_version: String,
    /// Identifier of the issuing device.
    pub device_fingerprint: String,
}

impl Default for ManifestServiceConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            planner_version: format!("covenant-planner/{}", env!("CARGO_PKG_VERSION")),
            model_version: "unspecified".to_string(),
            device_fingerprint: fingerprint::detect(),
        }
    }
}

/// What the caller is asking to be authorized.
#[derive(Debug, Clone)]
pub struct ManifestRequest {
    pub objective: String,
    pub autonomy_level: AutonomyLevel,
    pub vault_scope: Vec<String>,
    pub capability_scope: Vec<String>,
    pub biometric_gate: bool,
}

impl ManifestRequest {
    /// A request with empty scopes and the biometric gate off.
    pub fn new(objective: impl Into<String>, autonomy_level: AutonomyLevel) -> Self {
        Self {
            objective: objective.into(),
            autonomy_level,
            vault_scope: Vec::new(),
            capability_scope: Vec::new(),
            biometric_gate: false,
        }
    }

    /// Add a vault domain the action may touch.
    pub fn with_vault(mut self, vault: impl Into<String>) -> Self {
        self.vault_scope.push(vault.into());
        self
    }

    /// Add a tool name (or glob pattern) the action may invoke.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability_scope.push(capability.into());
        self
    }

    pub fn with_biometric_gate(mut self, gate: bool) -> Self {
        self.biometric_gate = gate;
        self
    }
}

/// Why a manifest was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// `expires_at` is in the past.
    Expired,
    /// The objective text no longer matches its hash.
    Tampered,
    /// The signature does not verify over the canonical manifest.
    SignatureInvalid,
    /// The manifest verifies, but under a key the caller does not trust.
    UntrustedSigner,
}

/// What the surrounding system should do about a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Harmless; a fresh manifest may be requested automatically.
    Reissue,
    /// Possible tampering; do not reissue without a human.
    Escalate,
}

impl RejectReason {
    /// Stable reason code for logs and alerts.
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Expired => "MANIFEST_EXPIRED",
            RejectReason::Tampered => "MANIFEST_TAMPERED",
            RejectReason::SignatureInvalid => "SIGNATURE_INVALID",
            RejectReason::UntrustedSigner => "UNTRUSTED_SIGNER",
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            RejectReason::Expired => Disposition::Reissue,
            _ => Disposition::Escalate,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of validating a signed manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Rejected(RejectReason),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Validation::Valid => None,
            Validation::Rejected(reason) => Some(*reason),
        }
    }
}

/// Issues manifests signed by a shared [`IdentityAuthority`] and validates
/// manifests from any signer.
pub struct ManifestService {
    identity: Arc<IdentityAuthority>,
    config: ManifestServiceConfig,
    rng: SystemRandom,
}

impl ManifestService {
    pub fn new(identity: Arc<IdentityAuthority>, config: ManifestServiceConfig) -> Self {
        Self {
            identity,
            config,
            rng: SystemRandom::new(),
        }
    }

    pub fn config(&self) -> &ManifestServiceConfig {
        &self.config
    }

    /// Issue a manifest stamped with the current time.
    pub fn create(&self, request: ManifestRequest) -> Result<SignedManifest, ManifestError> {
        self.create_at(request, Utc::now())
    }

    /// Issue a manifest as if the current time were `now`.
    pub fn create_at(
        &self,
        request: ManifestRequest,
        now: DateTime<Utc>,
    ) -> Result<SignedManifest, ManifestError> {
        let root_public_key = self.identity.require_public_identity()?;
        let manifest = ExecutionManifest::from_parts(ManifestParts {
            execution_id: Uuid::now_v7(),
            root_public_key,
            device_fingerprint: self.config.device_fingerprint.clone(),
            created_at: now,
            expires_at: now + self.config.ttl,
            objective: ManifestObjective::new(request.objective),
            autonomy_level: request.autonomy_level,
            vault_scope: request.vault_scope,
            capability_scope: request.capability_scope,
            biometric_gate: request.biometric_gate,
            planner_version: self.config.planner_version.clone(),
            model_version: self.config.model_version.clone(),
            nonce: self.draw_nonce()?,
        });

        let signature = self.identity.sign(&manifest.canonical_bytes()?)?;
        tracing::info!(
            execution_id = %manifest.execution_id(),
            autonomy_level = %manifest.autonomy_level(),
            expires_at = %manifest.expires_at(),
            "issued execution manifest"
        );
        Ok(SignedManifest {
            manifest,
            signature,
        })
    }

    /// Validate against the current time.
    pub fn validate(&self, signed: &SignedManifest) -> Validation {
        self.validate_at(signed, Utc::now())
    }

    /// Validate as if the current time were `now`.
    pub fn validate_at(&self, signed: &SignedManifest, now: DateTime<Utc>) -> Validation {
        validate_manifest_at(signed, now)
    }

    /// Validate, additionally requiring the signer to be one of `trusted`.
    pub fn validate_trusted(
        &self,
        signed: &SignedManifest,
        trusted: &[PublicIdentity],
    ) -> Validation {
        let validation = self.validate(signed);
        if validation.is_valid() && !trusted.contains(signed.manifest.root_public_key()) {
            tracing::warn!(
                execution_id = %signed.execution_id(),
                signer = %signed.manifest.root_public_key(),
                reason = RejectReason::UntrustedSigner.code(),
                "manifest rejected"
            );
            return Validation::Rejected(RejectReason::UntrustedSigner);
        }
        validation
    }

    fn draw_nonce(&self) -> Result<String, ManifestError> {
        let mut bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| ManifestError::Randomness)?;
        Ok(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

/// Stateless manifest validation. Needs no key material: the signature is
/// checked against the manifest's own `rootPublicKey`.
pub fn validate_manifest_at(signed: &SignedManifest, now: DateTime<Utc>) -> Validation {
    let manifest = &signed.manifest;
    let outcome = if manifest.is_expired_at(now) {
        Validation::Rejected(RejectReason::Expired)
    } else if !manifest.objective().is_intact() {
        Validation::Rejected(RejectReason::Tampered)
    } else {
        match manifest.canonical_bytes() {
            Ok(bytes)
                if verify_signature(&bytes, &signed.signature, manifest.root_public_key()) =>
            {
                Validation::Valid
            }
            _ => Validation::Rejected(RejectReason::SignatureInvalid),
        }
    };

    if let Validation::Rejected(reason) = outcome {
        tracing::warn!(
            execution_id = %manifest.execution_id(),
            reason = reason.code(),
            "manifest rejected"
        );
    }
    outcome
}
