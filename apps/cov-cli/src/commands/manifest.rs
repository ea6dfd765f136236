// manifest.rs: Manifest subcommands (create, validate).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Subcommand;
use cov_identity::IdentityAuthority;
use cov_manifest::{
    validate_manifest_at, AutonomyLevel, ManifestRequest, ManifestService, SignedManifest,
    Validation,
};

use crate::config::CovenantConfig;

#[derive(Subcommand)]
pub enum ManifestCommands {
    /// Issue a signed manifest for an objective.
    Create {
        /// What the planner intends to accomplish.
        objective: String,
        /// Autonomy ceiling: restricted, semi-autonomous, or sovereign.
        #[arg(long, default_value = "restricted")]
        level: String,
        /// Vault the action may touch (repeatable, glob patterns allowed).
        #[arg(long)]
        vault: Vec<String>,
        /// Tool the action may invoke (repeatable, glob patterns allowed).
        #[arg(long)]
        capability: Vec<String>,
        /// Require a biometric confirmation before execution.
        #[arg(long)]
        biometric_gate: bool,
        /// Write the manifest here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check a signed manifest's expiry, objective hash, and signature.
    Validate {
        /// Path to a signed manifest JSON file.
        file: PathBuf,
        /// Also require the signer to be this installation's identity
        /// (current or retired).
        #[arg(long)]
        trusted: bool,
    },
}

pub fn execute(cmd: &ManifestCommands, config: &CovenantConfig) -> anyhow::Result<()> {
    match cmd {
        ManifestCommands::Create {
            objective,
            level,
            vault,
            capability,
            biometric_gate,
            out,
        } => {
            let level: AutonomyLevel = level.parse()?;
            let identity = Arc::new(IdentityAuthority::open(&config.identity_dir)?);
            let service = ManifestService::new(identity, config.manifest_service_config()?);

            let mut request =
                ManifestRequest::new(objective.clone(), level).with_biometric_gate(*biometric_gate);
            for v in vault {
                request = request.with_vault(v.clone());
            }
            for c in capability {
                request = request.with_capability(c.clone());
            }

            let signed = service.create(request)?;
            let json = serde_json::to_string_pretty(&signed)?;
            match out {
                Some(path) => {
                    std::fs::write(path, format!("{}\n", json))?;
                    println!(
                        "Manifest {} written to {} (expires {})",
                        signed.execution_id(),
                        path.display(),
                        signed.manifest.expires_at().to_rfc3339()
                    );
                }
                None => println!("{}", json),
            }
        }

        ManifestCommands::Validate { file, trusted } => {
            let signed = read_manifest(file)?;
            let validation = if *trusted {
                let identity = Arc::new(IdentityAuthority::load(&config.identity_dir)?);
                let keys = identity.known_identities();
                ManifestService::new(identity, config.manifest_service_config()?)
                    .validate_trusted(&signed, &keys)
            } else {
                validate_manifest_at(&signed, Utc::now())
            };
            report(&signed, validation)?;
        }
    }

    Ok(())
}

/// Read a signed manifest from a JSON file.
pub fn read_manifest(path: &Path) -> anyhow::Result<SignedManifest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read manifest {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Print a validation outcome; rejected manifests fail the command.
pub fn report(signed: &SignedManifest, validation: Validation) -> anyhow::Result<()> {
    match validation {
        Validation::Valid => {
            println!(
                "Manifest {} valid: {} until {}",
                signed.execution_id(),
                signed.manifest.autonomy_level(),
                signed.manifest.expires_at().to_rfc3339()
            );
            Ok(())
        }
        Validation::Rejected(reason) => {
            println!("MANIFEST REJECTED: {}", reason.code());
            println!("  Execution id: {}", signed.execution_id());
            println!("  Disposition:  {:?}", reason.disposition());
            anyhow::bail!("Manifest validation failed: {}", reason)
        }
    }
}
