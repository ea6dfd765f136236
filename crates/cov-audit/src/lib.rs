//! # cov-audit
//!
//! Append-only, signed, hash-chained ledger of executed actions for Covenant.
//!
//! Every action the agent executes under a manifest is recorded as a
//! [`LedgerEntry`]: the canonical hash of the action payload, an Ed25519
//! signature from the installation's identity, and the running chain hash
//! before the entry. Editing, deleting, or reordering any stored entry is
//! detected by [`AuditLedger::verify_chain`], which reports the 1-based
//! position of the first broken entry.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cov_audit::AuditLedger;
//! use cov_identity::IdentityAuthority;
//!
//! let identity = Arc::new(IdentityAuthority::ephemeral());
//! identity.ensure_identity().unwrap();
//! let ledger = AuditLedger::in_memory(identity);
//!
//! ledger
//!     .record_entry("exec-1", "step_1", &serde_json::json!({"tool": "gmail.read"}))
//!     .unwrap();
//! assert!(ledger.verify_chain().is_intact());
//! ```

pub mod chain;
pub mod entry;
pub mod error;
pub mod ledger;

pub use chain::{verify_entries, verify_entry, ChainBreak, ChainFault, ChainReport};
pub use entry::{action_hash, chain_link, LedgerEntry, GENESIS_HASH};
pub use error::LedgerError;
pub use ledger::{AuditLedger, LedgerState};
