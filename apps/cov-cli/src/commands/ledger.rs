// ledger.rs: Ledger subcommands (record, verify, tail).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use cov_audit::{AuditLedger, ChainReport};
use cov_identity::IdentityAuthority;

use crate::config::CovenantConfig;

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Record an executed action.
    Record {
        /// Execution id of the manifest the action ran under.
        #[arg(long)]
        execution_id: String,
        /// Task identifier within the execution.
        #[arg(long)]
        task_id: String,
        /// Action payload as JSON. Only its canonical hash is stored.
        #[arg(long)]
        payload: String,
        /// Path to ledger (defaults to <home>/ledger.jsonl).
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Verify every link and signature in the ledger.
    Verify {
        /// Path to ledger (defaults to <home>/ledger.jsonl).
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Show recent ledger entries.
    Tail {
        /// Path to ledger (defaults to <home>/ledger.jsonl).
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &LedgerCommands, config: &CovenantConfig) -> anyhow::Result<()> {
    match cmd {
        LedgerCommands::Record {
            execution_id,
            task_id,
            payload,
            ledger,
        } => {
            let path = ledger.clone().unwrap_or_else(|| config.ledger_path.clone());
            let payload: serde_json::Value = serde_json::from_str(payload)
                .map_err(|e| anyhow::anyhow!("payload is not valid JSON: {}", e))?;

            let identity = Arc::new(IdentityAuthority::open(&config.identity_dir)?);
            let ledger = AuditLedger::open(&path, identity)?;
            let entry = ledger.record_entry(execution_id.clone(), task_id.clone(), &payload)?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }

        LedgerCommands::Verify { ledger } => {
            let path = ledger.clone().unwrap_or_else(|| config.ledger_path.clone());
            if !path.exists() {
                println!("No ledger found at {}", path.display());
                return Ok(());
            }

            let identity = IdentityAuthority::load(&config.identity_dir)?;
            let keys = identity.known_identities();
            if keys.is_empty() {
                anyhow::bail!(
                    "No identity at {} to verify against",
                    config.identity_dir.display()
                );
            }

            match AuditLedger::verify_file(&path, &keys)? {
                ChainReport::Intact { entries, head } => {
                    println!("Ledger verified: {} entry(ies), chain intact.", entries);
                    println!("  Head: {}", head);
                }
                ChainReport::ChainBroken(brk) => {
                    println!("CHAIN BROKEN at entry {}:", brk.position);
                    println!("  Task:  {}", brk.task_id);
                    println!("  Fault: {}", brk.fault);
                    println!();
                    println!("The ledger may have been tampered with.");
                    anyhow::bail!("Ledger integrity check failed");
                }
            }
        }

        LedgerCommands::Tail { ledger, n } => {
            let path = ledger.clone().unwrap_or_else(|| config.ledger_path.clone());
            if !path.exists() {
                println!("No ledger found at {}", path.display());
                return Ok(());
            }

            let entries = AuditLedger::read_all(&path)?;
            let start = entries.len().saturating_sub(*n);
            let recent = &entries[start..];

            if recent.is_empty() {
                println!("No ledger entries.");
                return Ok(());
            }

            println!(
                "{:<20} {:<38} {:<16} ACTION HASH",
                "TIMESTAMP", "EXECUTION", "TASK"
            );
            println!("{}", "-".repeat(100));

            for entry in recent {
                println!(
                    "{:<20} {:<38} {:<16} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.execution_id,
                    entry.task_id,
                    entry.action_hash.get(..16).unwrap_or(&entry.action_hash),
                );
            }
        }
    }

    Ok(())
}
