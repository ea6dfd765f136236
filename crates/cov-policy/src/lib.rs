//! # cov-policy
//!
//! Autonomy policy engine for Covenant.
//!
//! Decides whether an autonomous action may proceed, given the manifest's
//! autonomy level, an externally computed risk score, and the user's
//! affective state. The [`AutonomyPolicyEngine`] is a pure function of
//! those three inputs.
//!
//! ## Key invariants
//!
//! - **Hard ceiling**: RESTRICTED manifests never accept risk above 10.
//! - **Degrade, never disable**: both affective modulators are floored at 0.2.
//! - **Fail closed**: out-of-range or NaN risk scores are rejected; scope
//!   checks deny on empty scopes and invalid patterns.

pub mod ace;
pub mod engine;
pub mod error;
pub mod scope;

pub use ace::AceStateVector;
pub use engine::{
    base_threshold, dynamic_threshold, AutonomyPolicyEngine, EvaluationStep, EvaluationTrace,
    Modulators, PolicyDecision, PolicyRejection, MODULATOR_FLOOR, RESTRICTED_RISK_CEILING,
};
pub use error::PolicyError;
pub use scope::{permits_capability, permits_vault};
