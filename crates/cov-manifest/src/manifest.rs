// manifest.rs: Execution manifest data model.
//
// A manifest is the signed "intent" for one autonomous action: what was
// asked for, under which autonomy ceiling, touching which vaults and tools,
// and until when. Fields are private and only readable through accessors;
// the signature covers the canonical form of the whole struct, so any
// change made through serialization is caught by validation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cov_identity::{canonical_bytes, hasher, PublicIdentity, Signature};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ManifestError;

/// Current manifest schema version.
pub const MANIFEST_VERSION: &str = "1.0";

/// How much risk an agent may take on without a human in the loop.
///
/// Ordered: `Restricted < SemiAutonomous < Sovereign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutonomyLevel {
    Restricted,
    SemiAutonomous,
    Sovereign,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Restricted => "RESTRICTED",
            AutonomyLevel::SemiAutonomous => "SEMI_AUTONOMOUS",
            AutonomyLevel::Sovereign => "SOVEREIGN",
        }
    }
}

impl fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutonomyLevel {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "RESTRICTED" => Ok(AutonomyLevel::Restricted),
            "SEMI_AUTONOMOUS" => Ok(AutonomyLevel::SemiAutonomous),
            "SOVEREIGN" => Ok(AutonomyLevel::Sovereign),
            _ => Err(ManifestError::UnknownAutonomyLevel(s.to_string())),
        }
    }
}

/// The requested objective and its digest.
///
/// `objective_hash` lets a verifier notice an edited `raw` even without the
/// signer's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestObjective {
    raw: String,
    objective_hash: String,
}

impl ManifestObjective {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let objective_hash = hasher::hash_str(&raw);
        Self {
            raw,
            objective_hash,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn objective_hash(&self) -> &str {
        &self.objective_hash
    }

    /// Whether `objective_hash` still matches `raw`.
    pub fn is_intact(&self) -> bool {
        hasher::hash_str(&self.raw) == self.objective_hash
    }
}

/// The authorization intent for one autonomous action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionManifest {
    version: String,
    execution_id: Uuid,
    root_public_key: PublicIdentity,
    device_fingerprint: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    objective: ManifestObjective,
    autonomy_level: AutonomyLevel,
    vault_scope: Vec<String>,
    capability_scope: Vec<String>,
    biometric_gate: bool,
    planner_version: String,
    model_version: String,
    nonce: String,
}

/// Field values for a manifest, assembled by the issuing service.
pub(crate) struct ManifestParts {
    pub execution_id: Uuid,
    pub root_public_key: PublicIdentity,
    pub device_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub objective: ManifestObjective,
    pub autonomy_level: AutonomyLevel,
    pub vault_scope: Vec<String>,
    pub capability_scope: Vec<String>,
    pub biometric_gate: bool,
    pub planner_version: String,
    pub model_version: String,
    pub nonce: String,
}

impl ExecutionManifest {
    pub(crate) fn from_parts(parts: ManifestParts) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            execution_id: parts.execution_id,
            root_public_key: parts.root_public_key,
            device_fingerprint: parts.device_fingerprint,
            created_at: parts.created_at,
            expires_at: parts.expires_at,
            objective: parts.objective,
            autonomy_level: parts.autonomy_level,
            vault_scope: parts.vault_scope,
            capability_scope: parts.capability_scope,
            biometric_gate: parts.biometric_gate,
            planner_version: parts.planner_version,
            model_version: parts.model_version,
            nonce: parts.nonce,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn root_public_key(&self) -> &PublicIdentity {
        &self.root_public_key
    }

    pub fn device_fingerprint(&self) -> &str {
        &self.device_fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn objective(&self) -> &ManifestObjective {
        &self.objective
    }

    pub fn autonomy_level(&self) -> AutonomyLevel {
        self.autonomy_level
    }

    pub fn vault_scope(&self) -> &[String] {
        &self.vault_scope
    }

    pub fn capability_scope(&self) -> &[String] {
        &self.capability_scope
    }

    pub fn biometric_gate(&self) -> bool {
        self.biometric_gate
    }

    pub fn planner_version(&self) -> &str {
        &self.planner_version
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Strictly past `expires_at`. The instant itself is still valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// The exact bytes the signature covers.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        canonical_bytes(self)
    }
}

/// A manifest together with the signature over its canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedManifest {
    pub manifest: ExecutionManifest,
    pub signature: Signature,
}

impl SignedManifest {
    pub fn execution_id(&self) -> Uuid {
        self.manifest.execution_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autonomy_levels_are_ordered() {
        assert!(AutonomyLevel::Restricted < AutonomyLevel::SemiAutonomous);
        assert!(AutonomyLevel::SemiAutonomous < AutonomyLevel::Sovereign);
    }

    #[test]
    fn autonomy_level_wire_names() {
        assert_eq!(
            serde_json::to_string(&AutonomyLevel::SemiAutonomous).unwrap(),
            "\"SEMI_AUTONOMOUS\""
        );
        assert_eq!(
            "semi-autonomous".parse::<AutonomyLevel>().unwrap(),
            AutonomyLevel::SemiAutonomous
        );
        assert!(matches!(
            "GODMODE".parse::<AutonomyLevel>(),
            Err(ManifestError::UnknownAutonomyLevel(_))
        ));
    }

    #[test]
    fn objective_hash_detects_edits() {
        let objective = ManifestObjective::new("email the landlord");
        assert!(objective.is_intact());

        let mut edited = objective.clone();
        edited.raw = "email the landlord and cancel the lease".to_string();
        assert!(!edited.is_intact());
    }

    #[test]
    fn objective_serializes_camel_case() {
        let json = serde_json::to_value(ManifestObjective::new("x")).unwrap();
        assert!(json.get("objectiveHash").is_some());
        assert_eq!(json["raw"], "x");
    }
}
