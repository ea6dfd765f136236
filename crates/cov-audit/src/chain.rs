// chain.rs: Hash-chain and signature verification.
//
// Walks entries from genesis. For each entry:
//   1. its previousHash must equal the recomputed running hash
//   2. its signature must verify under one of the supplied public identities
// then the running hash advances. The first failure stops the walk, so a
// single edited field anywhere makes verification fail from that entry on.

use std::fmt;

use cov_identity::{verify_signature, PublicIdentity};
use serde::{Deserialize, Serialize};

use crate::entry::{chain_link, LedgerEntry, GENESIS_HASH};

/// What is wrong with a broken entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum ChainFault {
    /// The entry does not link to the recomputed running hash.
    PreviousHashMismatch { expected: String, actual: String },
    /// The entry's signature verifies under none of the known identities.
    SignatureInvalid,
    /// The stored entry could not be parsed or canonicalized.
    Unreadable { reason: String },
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFault::PreviousHashMismatch { expected, actual } => write!(
                f,
                "previous hash mismatch: expected {}, got {}",
                expected, actual
            ),
            ChainFault::SignatureInvalid => f.write_str("signature invalid"),
            ChainFault::Unreadable { reason } => write!(f, "unreadable entry: {}", reason),
        }
    }
}

/// The first broken link in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    /// 1-based position of the offending entry.
    pub position: usize,
    /// Task id of the offending entry.
    pub task_id: String,
    pub fault: ChainFault,
}

/// Result of verifying a whole chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainReport {
    /// Every entry links and verifies. `head` is the final running hash.
    Intact { entries: usize, head: String },
    /// The chain is broken. Treat as a security alert, not a retryable error.
    ChainBroken(ChainBreak),
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainReport::Intact { .. })
    }

    pub fn broken_at(&self) -> Option<&ChainBreak> {
        match self {
            ChainReport::Intact { .. } => None,
            ChainReport::ChainBroken(brk) => Some(brk),
        }
    }
}

/// Check one entry against the running hash that should precede it.
pub fn verify_entry(
    entry: &LedgerEntry,
    expected_previous: &str,
    keys: &[PublicIdentity],
) -> Result<(), ChainFault> {
    if entry.previous_hash != expected_previous {
        return Err(ChainFault::PreviousHashMismatch {
            expected: expected_previous.to_string(),
            actual: entry.previous_hash.clone(),
        });
    }
    let payload = entry.signing_payload();
    if !keys
        .iter()
        .any(|key| verify_signature(&payload, &entry.signature, key))
    {
        return Err(ChainFault::SignatureInvalid);
    }
    Ok(())
}

/// Verify a sequence of entries from genesis.
pub fn verify_entries(entries: &[LedgerEntry], keys: &[PublicIdentity]) -> ChainReport {
    let mut running = GENESIS_HASH.to_string();
    for (i, entry) in entries.iter().enumerate() {
        let fault = match verify_entry(entry, &running, keys) {
            Ok(()) => match chain_link(&running, entry) {
                Ok(next) => {
                    running = next;
                    continue;
                }
                Err(e) => ChainFault::Unreadable {
                    reason: e.to_string(),
                },
            },
            Err(fault) => fault,
        };
        return ChainReport::ChainBroken(ChainBreak {
            position: i + 1,
            task_id: entry.task_id.clone(),
            fault,
        });
    }
    ChainReport::Intact {
        entries: entries.len(),
        head: running,
    }
}
