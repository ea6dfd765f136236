// policy.rs: Policy subcommands (evaluate).

use std::path::PathBuf;

use chrono::Utc;
use clap::Subcommand;
use cov_manifest::validate_manifest_at;
use cov_policy::{AceStateVector, AutonomyPolicyEngine, PolicyDecision};

use crate::commands::manifest::{read_manifest, report};
use crate::config::CovenantConfig;

#[derive(Subcommand)]
pub enum PolicyCommands {
    /// Decide whether an action may proceed under a manifest.
    Evaluate {
        /// Path to the signed manifest the action runs under.
        #[arg(long)]
        manifest: PathBuf,
        /// Risk score from the external critic, 0 to 100.
        #[arg(long)]
        risk: f64,
        /// Physical energy, 0 (exhausted) to 1 (rested).
        #[arg(long, default_value = "1.0")]
        energy: f64,
        /// Emotional valence, 0 (negative) to 1 (positive).
        #[arg(long, default_value = "0.5")]
        valence: f64,
        /// Cognitive load, 0 (idle) to 1 (overloaded).
        #[arg(long, default_value = "0.0")]
        load: f64,
        /// Print every evaluation step.
        #[arg(long)]
        trace: bool,
    },
}

pub fn execute(cmd: &PolicyCommands, _config: &CovenantConfig) -> anyhow::Result<()> {
    match cmd {
        PolicyCommands::Evaluate {
            manifest,
            risk,
            energy,
            valence,
            load,
            trace,
        } => {
            let signed = read_manifest(manifest)?;
            let validation = validate_manifest_at(&signed, Utc::now());
            if !validation.is_valid() {
                return report(&signed, validation);
            }

            let state = AceStateVector::new(*energy, *valence, *load)?;
            let engine = AutonomyPolicyEngine::new();
            let decision = if *trace {
                let evaluation = engine.evaluate_with_trace(&signed.manifest, *risk, &state);
                for (i, step) in evaluation.steps.iter().enumerate() {
                    println!(
                        "  {}. [{}] {}{}",
                        i + 1,
                        step.check,
                        step.outcome,
                        if step.terminal { " (terminal)" } else { "" }
                    );
                }
                evaluation.decision
            } else {
                engine.decide(&signed.manifest, *risk, &state)
            };

            match decision {
                PolicyDecision::Approve { threshold } => {
                    println!("APPROVED: risk {} within threshold {:.2}", risk, threshold);
                }
                PolicyDecision::Reject { reason } => {
                    println!("REJECTED: {}", reason.code());
                    println!("{}", serde_json::to_string_pretty(&reason)?);
                    anyhow::bail!("Action rejected by autonomy policy");
                }
            }
        }
    }

    Ok(())
}
