// engine.rs: Autonomy policy decisions.
//
// Every proposed action passes through `decide()` which checks:
//
// 1. Is the risk score a number in [0, 100]? → No → Reject
// 2. RESTRICTED and risk > 10? → Reject, whatever the affective state
// 3. energy modulator = max(0.2, physicalEnergy)
//    load modulator   = max(0.2, 1 - cognitiveLoad)
// 4. threshold = base(level) * energy * load
//    with base RESTRICTED = 10, SEMI_AUTONOMOUS = 50, SOVEREIGN = 90
// 5. risk <= threshold? → Approve, else Reject
//
// The 0.2 floor means a depleted or overloaded user degrades autonomy but
// never disables it. The function is pure: same inputs, same bits out.
// Rejections are not retried here; the caller may re-request with a
// narrower scope or wait for the affective state to recover.

use cov_manifest::{AutonomyLevel, ExecutionManifest};
use serde::{Deserialize, Serialize};

use crate::ace::AceStateVector;

/// Absolute risk cap for RESTRICTED manifests.
pub const RESTRICTED_RISK_CEILING: f64 = 10.0;

/// Lower bound on both affective modulators.
pub const MODULATOR_FLOOR: f64 = 0.2;

/// Highest risk score the external critic can report.
pub const MAX_RISK_SCORE: f64 = 100.0;

/// Base risk threshold for each autonomy level, before modulation.
pub fn base_threshold(level: AutonomyLevel) -> f64 {
    match level {
        AutonomyLevel::Restricted => 10.0,
        AutonomyLevel::SemiAutonomous => 50.0,
        AutonomyLevel::Sovereign => 90.0,
    }
}

/// Why an action was not approved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PolicyRejection {
    /// The risk score was NaN or outside [0, 100].
    InvalidRiskScore { risk_score: f64 },
    /// RESTRICTED manifests never accept risk above the hard ceiling.
    RestrictedCeiling { risk_score: f64 },
    /// The risk exceeded the affect-modulated threshold.
    ThresholdExceeded { risk_score: f64, threshold: f64 },
}

impl PolicyRejection {
    /// Stable reason code for logs and callers.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyRejection::InvalidRiskScore { .. } => "INVALID_RISK_SCORE",
            PolicyRejection::RestrictedCeiling { .. } => "RESTRICTED_CEILING",
            PolicyRejection::ThresholdExceeded { .. } => "THRESHOLD_EXCEEDED",
        }
    }
}

/// The result of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The action may proceed. `threshold` is the modulated limit it cleared.
    Approve { threshold: f64 },
    /// The action must not proceed.
    Reject { reason: PolicyRejection },
}

impl PolicyDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, PolicyDecision::Approve { .. })
    }
}

/// A step in the evaluation chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationStep {
    /// Which check was performed (e.g., "risk_score_range", "threshold").
    pub check: String,
    /// The outcome of this check.
    pub outcome: String,
    /// Whether this step was the terminal decision point.
    pub terminal: bool,
}

/// Full evaluation trace returned alongside a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationTrace {
    pub decision: PolicyDecision,
    pub steps: Vec<EvaluationStep>,
}

/// Affect-derived factors applied to the base threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modulators {
    pub energy: f64,
    pub load: f64,
}

impl Modulators {
    /// Compute both modulators. Components are clamped to [0, 1]; a NaN
    /// reading is treated as the worst case (no energy, full load).
    pub fn from_state(state: &AceStateVector) -> Self {
        let energy = unit_or(state.physical_energy, 0.0);
        let load = unit_or(state.cognitive_load, 1.0);
        Self {
            energy: energy.max(MODULATOR_FLOOR),
            load: (1.0 - load).max(MODULATOR_FLOOR),
        }
    }
}

/// The threshold a risk score must not exceed for `level` under `state`.
pub fn dynamic_threshold(level: AutonomyLevel, state: &AceStateVector) -> f64 {
    let m = Modulators::from_state(state);
    base_threshold(level) * m.energy * m.load
}

fn unit_or(value: f64, nan_default: f64) -> f64 {
    if value.is_nan() {
        nan_default
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Stateless autonomy policy engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutonomyPolicyEngine;

impl AutonomyPolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Approve (`true`) or reject (`false`) an action.
    pub fn evaluate(
        &self,
        manifest: &ExecutionManifest,
        risk_score: f64,
        state: &AceStateVector,
    ) -> bool {
        self.decide(manifest, risk_score, state).is_approved()
    }

    /// Evaluate and return the decision with its reason.
    pub fn decide(
        &self,
        manifest: &ExecutionManifest,
        risk_score: f64,
        state: &AceStateVector,
    ) -> PolicyDecision {
        let decision = run(manifest.autonomy_level(), risk_score, state, &mut None);
        match &decision {
            PolicyDecision::Approve { threshold } => tracing::debug!(
                execution_id = %manifest.execution_id(),
                risk_score,
                threshold,
                "action approved"
            ),
            PolicyDecision::Reject { reason } => tracing::warn!(
                execution_id = %manifest.execution_id(),
                risk_score,
                reason = reason.code(),
                "action rejected"
            ),
        }
        decision
    }

    /// Same logic as `decide()` but records every step.
    pub fn evaluate_with_trace(
        &self,
        manifest: &ExecutionManifest,
        risk_score: f64,
        state: &AceStateVector,
    ) -> EvaluationTrace {
        let mut steps = Some(Vec::new());
        let decision = run(manifest.autonomy_level(), risk_score, state, &mut steps);
        EvaluationTrace {
            decision,
            steps: steps.unwrap_or_default(),
        }
    }
}

fn record(steps: &mut Option<Vec<EvaluationStep>>, check: &str, outcome: String, terminal: bool) {
    if let Some(steps) = steps {
        steps.push(EvaluationStep {
            check: check.to_string(),
            outcome,
            terminal,
        });
    }
}

fn run(
    level: AutonomyLevel,
    risk_score: f64,
    state: &AceStateVector,
    steps: &mut Option<Vec<EvaluationStep>>,
) -> PolicyDecision {
    // Step 1: Risk score sanity. NaN fails `contains`, so it lands here too.
    if !(0.0..=MAX_RISK_SCORE).contains(&risk_score) {
        record(
            steps,
            "risk_score_range",
            format!("failed: {} is outside [0, 100]", risk_score),
            true,
        );
        return PolicyDecision::Reject {
            reason: PolicyRejection::InvalidRiskScore { risk_score },
        };
    }
    record(steps, "risk_score_range", "passed".to_string(), false);

    // Step 2: RESTRICTED hard ceiling, independent of affect.
    if level == AutonomyLevel::Restricted && risk_score > RESTRICTED_RISK_CEILING {
        record(
            steps,
            "restricted_ceiling",
            format!("failed: {} > {}", risk_score, RESTRICTED_RISK_CEILING),
            true,
        );
        return PolicyDecision::Reject {
            reason: PolicyRejection::RestrictedCeiling { risk_score },
        };
    }
    record(steps, "restricted_ceiling", "passed".to_string(), false);

    // Steps 3-4: Affective modulation of the level's base threshold.
    let m = Modulators::from_state(state);
    let threshold = base_threshold(level) * m.energy * m.load;
    record(
        steps,
        "modulation",
        format!(
            "base {} x energy {} x load {} = {}",
            base_threshold(level),
            m.energy,
            m.load,
            threshold
        ),
        false,
    );

    // Step 5: Compare.
    if risk_score <= threshold {
        record(
            steps,
            "threshold",
            format!("approved: {} <= {}", risk_score, threshold),
            true,
        );
        PolicyDecision::Approve { threshold }
    } else {
        record(
            steps,
            "threshold",
            format!("rejected: {} > {}", risk_score, threshold),
            true,
        );
        PolicyDecision::Reject {
            reason: PolicyRejection::ThresholdExceeded {
                risk_score,
                threshold,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cov_identity::IdentityAuthority;
    use cov_manifest::{ManifestRequest, ManifestService, ManifestServiceConfig};
    use std::sync::Arc;

    fn manifest(level: AutonomyLevel) -> ExecutionManifest {
        let identity = Arc::new(IdentityAuthority::ephemeral());
        identity.ensure_identity().unwrap();
        ManifestService::new(identity, ManifestServiceConfig::default())
            .create(ManifestRequest::new("reconcile invoices", level))
            .unwrap()
            .manifest
    }

    fn ace(energy: f64, load: f64) -> AceStateVector {
        AceStateVector::new(energy, 0.5, load).unwrap()
    }

    #[test]
    fn sovereign_tired_and_loaded_threshold() {
        let state = ace(0.3, 0.8);
        let m = Modulators::from_state(&state);
        assert_eq!(m.energy, 0.3);
        assert_eq!(m.load, 0.2);

        let threshold = dynamic_threshold(AutonomyLevel::Sovereign, &state);
        assert!((threshold - 5.4).abs() < 1e-9, "threshold was {threshold}");

        let engine = AutonomyPolicyEngine::new();
        let sovereign = manifest(AutonomyLevel::Sovereign);
        assert!(!engine.evaluate(&sovereign, 6.0, &state));
        assert!(engine.evaluate(&sovereign, 5.0, &state));
    }

    #[test]
    fn restricted_ceiling_ignores_affect() {
        let engine = AutonomyPolicyEngine::new();
        let restricted = manifest(AutonomyLevel::Restricted);
        let best = ace(1.0, 0.0);

        let decision = engine.decide(&restricted, 11.0, &best);
        assert_eq!(
            decision,
            PolicyDecision::Reject {
                reason: PolicyRejection::RestrictedCeiling { risk_score: 11.0 }
            }
        );
        assert!(engine.evaluate(&restricted, 10.0, &best));
    }

    #[test]
    fn floor_keeps_autonomy_alive() {
        // Fully depleted and overloaded: 50 * 0.2 * 0.2 = 2.0
        let engine = AutonomyPolicyEngine::new();
        let semi = manifest(AutonomyLevel::SemiAutonomous);
        let worst = ace(0.0, 1.0);
        assert!((dynamic_threshold(AutonomyLevel::SemiAutonomous, &worst) - 2.0).abs() < 1e-12);
        assert!(engine.evaluate(&semi, 1.5, &worst));
        assert!(!engine.evaluate(&semi, 2.5, &worst));
    }

    #[test]
    fn nominal_state_uses_full_base() {
        let state = AceStateVector::nominal();
        assert_eq!(dynamic_threshold(AutonomyLevel::Restricted, &state), 10.0);
        assert_eq!(dynamic_threshold(AutonomyLevel::SemiAutonomous, &state), 50.0);
        assert_eq!(dynamic_threshold(AutonomyLevel::Sovereign, &state), 90.0);
    }

    #[test]
    fn valence_does_not_move_threshold() {
        let a = AceStateVector::new(0.6, 0.0, 0.3).unwrap();
        let b = AceStateVector::new(0.6, 1.0, 0.3).unwrap();
        assert_eq!(
            dynamic_threshold(AutonomyLevel::Sovereign, &a).to_bits(),
            dynamic_threshold(AutonomyLevel::Sovereign, &b).to_bits()
        );
    }

    #[test]
    fn invalid_risk_scores_are_rejected() {
        let engine = AutonomyPolicyEngine::new();
        let sovereign = manifest(AutonomyLevel::Sovereign);
        let state = AceStateVector::nominal();
        for risk in [-1.0, 100.5, f64::NAN, f64::INFINITY] {
            match engine.decide(&sovereign, risk, &state) {
                PolicyDecision::Reject {
                    reason: PolicyRejection::InvalidRiskScore { .. },
                } => {}
                other => panic!("expected InvalidRiskScore for {risk}, got {other:?}"),
            }
        }
    }

    #[test]
    fn nan_affect_is_treated_as_worst_case() {
        let state = AceStateVector {
            physical_energy: f64::NAN,
            emotional_valence: 0.5,
            cognitive_load: f64::NAN,
        };
        let m = Modulators::from_state(&state);
        assert_eq!(m.energy, MODULATOR_FLOOR);
        assert_eq!(m.load, MODULATOR_FLOOR);
    }

    #[test]
    fn evaluation_is_reproducible() {
        let engine = AutonomyPolicyEngine::new();
        let semi = manifest(AutonomyLevel::SemiAutonomous);
        let state = ace(0.73, 0.41);
        let first = engine.decide(&semi, 20.0, &state);
        for _ in 0..10 {
            assert_eq!(engine.decide(&semi, 20.0, &state), first);
        }
    }

    #[test]
    fn trace_records_each_step() {
        let engine = AutonomyPolicyEngine::new();
        let sovereign = manifest(AutonomyLevel::Sovereign);
        let trace = engine.evaluate_with_trace(&sovereign, 6.0, &ace(0.3, 0.8));

        let checks: Vec<&str> = trace.steps.iter().map(|s| s.check.as_str()).collect();
        assert_eq!(
            checks,
            ["risk_score_range", "restricted_ceiling", "modulation", "threshold"]
        );
        assert!(trace.steps.last().unwrap().terminal);
        assert!(!trace.decision.is_approved());
    }

    #[test]
    fn trace_stops_at_restricted_ceiling() {
        let engine = AutonomyPolicyEngine::new();
        let restricted = manifest(AutonomyLevel::Restricted);
        let trace = engine.evaluate_with_trace(&restricted, 50.0, &AceStateVector::nominal());
        assert_eq!(trace.steps.len(), 2);
        assert_eq!(trace.steps[1].check, "restricted_ceiling");
    }

    #[test]
    fn decision_serializes_with_reason_code() {
        let decision = PolicyDecision::Reject {
            reason: PolicyRejection::RestrictedCeiling { risk_score: 11.0 },
        };
        let json = serde_json::to_value(decision).unwrap();
        assert_eq!(json["decision"], "reject");
        assert_eq!(json["reason"]["code"], "restricted_ceiling");
    }
}
