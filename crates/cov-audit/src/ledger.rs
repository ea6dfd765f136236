// ledger.rs: AuditLedger, the append-only, signed, hash-chained record of
// executed actions.
//
// The ledger is an explicit `LedgerState` (entries, running hash, version)
// plus an optional JSONL file. Appends take the write guard for the whole
// read-head → sign → persist → advance-head sequence, so concurrent callers
// can never fork the chain on a shared previousHash. Readers take the read
// guard and see each entry either fully applied or not at all.
//
// Entries are never edited or removed. Nothing in this type offers a way to.
//
// A stored line that does not parse is part of the chain's evidence, not an
// I/O failure: the ledger still opens, `verify_chain` reports the break at
// that line, and further appends are refused.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use cov_identity::{IdentityAuthority, PublicIdentity};
use serde::Serialize;

use crate::chain::{verify_entries, ChainBreak, ChainFault, ChainReport};
use crate::entry::{action_hash, chain_link, signing_payload, LedgerEntry, GENESIS_HASH};
use crate::error::LedgerError;

/// The chain's logical state, independent of storage.
#[derive(Debug, Clone)]
pub struct LedgerState {
    entries: Vec<LedgerEntry>,
    running_hash: String,
    version: u64,
}

impl LedgerState {
    /// An empty chain at genesis.
    pub fn genesis() -> Self {
        Self {
            entries: Vec::new(),
            running_hash: GENESIS_HASH.to_string(),
            version: 0,
        }
    }

    /// Rebuild state from stored entries. The running hash is recomputed
    /// from content; nothing is verified here.
    pub fn replay(entries: Vec<LedgerEntry>) -> Result<Self, LedgerError> {
        let mut running_hash = GENESIS_HASH.to_string();
        for entry in &entries {
            running_hash = chain_link(&running_hash, entry)?;
        }
        Ok(Self {
            version: entries.len() as u64,
            entries,
            running_hash,
        })
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn running_hash(&self) -> &str {
        &self.running_hash
    }

    /// Incremented once per applied entry.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, entry: LedgerEntry, next_hash: String) {
        self.entries.push(entry);
        self.running_hash = next_hash;
        self.version += 1;
    }
}

/// The first stored line that could not be read as an entry.
#[derive(Debug, Clone)]
struct Damage {
    /// 1-based entry position, counting non-blank lines.
    position: usize,
    /// 1-based line number in the file.
    line: usize,
    task_id: String,
    reason: String,
}

impl Damage {
    fn to_break(&self) -> ChainBreak {
        ChainBreak {
            position: self.position,
            task_id: self.task_id.clone(),
            fault: ChainFault::Unreadable {
                reason: self.reason.clone(),
            },
        }
    }
}

/// Entries read from a ledger file, up to the first unreadable line.
struct Stored {
    entries: Vec<LedgerEntry>,
    damage: Option<Damage>,
}

/// Verify the readable entries; if they hold, the damaged line is the break.
fn verify_stored(
    entries: &[LedgerEntry],
    damage: Option<&Damage>,
    keys: &[PublicIdentity],
) -> ChainReport {
    match (verify_entries(entries, keys), damage) {
        (ChainReport::Intact { .. }, Some(damage)) => ChainReport::ChainBroken(damage.to_break()),
        (report, _) => report,
    }
}

struct Inner {
    state: LedgerState,
    damage: Option<Damage>,
    file: Option<File>,
}

/// Append-only audit ledger signed by a shared [`IdentityAuthority`].
pub struct AuditLedger {
    identity: Arc<IdentityAuthority>,
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
}

impl AuditLedger {
    /// A ledger that lives only in memory.
    pub fn in_memory(identity: Arc<IdentityAuthority>) -> Self {
        Self {
            identity,
            inner: RwLock::new(Inner {
                state: LedgerState::genesis(),
                damage: None,
                file: None,
            }),
            path: None,
        }
    }

    /// Open (or create) a ledger backed by a JSONL file.
    ///
    /// Existing entries are loaded as stored, tampered or not; use
    /// `verify_chain` to judge them. New entries are appended to the file.
    /// Loading stops at the first unreadable line.
    pub fn open(path: impl AsRef<Path>, identity: Arc<IdentityAuthority>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        let (state, damage) = if path.exists() {
            let stored = read_stored(&path)?;
            (LedgerState::replay(stored.entries)?, stored.damage)
        } else {
            (LedgerState::genesis(), None)
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::OpenFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        // Append mode: existing lines are never overwritten.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LedgerError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        tracing::info!(
            path = %path.display(),
            entries = state.entries().len(),
            "opened audit ledger"
        );
        if let Some(damage) = &damage {
            tracing::error!(
                path = %path.display(),
                line = damage.line,
                reason = %damage.reason,
                "SECURITY: audit ledger has an unreadable entry; appends are refused"
            );
        }

        Ok(Self {
            identity,
            inner: RwLock::new(Inner {
                state,
                damage,
                file: Some(file),
            }),
            path: Some(path),
        })
    }

    /// Record that an authorized action was executed.
    ///
    /// The action payload is opaque; only its canonical hash is stored.
    pub fn record_entry<T: Serialize + ?Sized>(
        &self,
        execution_id: impl Into<String>,
        task_id: impl Into<String>,
        action_payload: &T,
    ) -> Result<LedgerEntry, LedgerError> {
        let execution_id = execution_id.into();
        let task_id = task_id.into();
        let action_hash = action_hash(action_payload)?;

        let mut inner = self.write_inner()?;
        if let Some(damage) = &inner.damage {
            return Err(LedgerError::Corrupt {
                path: self.path.clone().unwrap_or_default(),
                line: damage.line,
                reason: damage.reason.clone(),
            });
        }

        let timestamp = Utc::now();
        let signature =
            self.identity
                .sign(&signing_payload(&execution_id, &task_id, &timestamp, &action_hash))?;
        let entry = LedgerEntry {
            execution_id,
            task_id,
            timestamp,
            action_hash,
            signature,
            previous_hash: inner.state.running_hash.clone(),
        };
        let next_hash = chain_link(&inner.state.running_hash, &entry)?;

        // Persist before applying, so a failed write leaves memory untouched.
        if inner.file.is_some() {
            let mut line = serde_json::to_string(&entry)?;
            line.push('\n');
            let position = inner.state.entries.len() + 1;
            append_line(&mut inner, &line, position, self.path.as_deref())?;
        }
        inner.state.apply(entry.clone(), next_hash);

        tracing::debug!(
            execution_id = %entry.execution_id,
            task_id = %entry.task_id,
            position = inner.state.entries.len(),
            "recorded ledger entry"
        );
        Ok(entry)
    }

    /// Re-verify every link and signature from genesis.
    ///
    /// Signatures are accepted under the authority's current key or any key
    /// it has retired through rotation. Keys are read after the ledger guard
    /// is taken, so every entry in the snapshot was signed by a key in the
    /// key set (retired keys are never forgotten).
    pub fn verify_chain(&self) -> ChainReport {
        let guard = self.inner.read();
        let inner = match &guard {
            Ok(inner) => &**inner,
            Err(poisoned) => &**poisoned.get_ref(),
        };
        let keys = self.identity.known_identities();
        let report = verify_stored(inner.state.entries(), inner.damage.as_ref(), &keys);
        drop(guard);
        log_report(&report, self.path.as_deref());
        report
    }

    /// Snapshot of all entries, oldest first. Mutating the copy does not
    /// affect the ledger.
    pub fn get_history(&self) -> Vec<LedgerEntry> {
        self.read_inner()
            .map(|inner| inner.state.entries.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the full chain state.
    pub fn state(&self) -> Result<LedgerState, LedgerError> {
        Ok(self.read_inner()?.state.clone())
    }

    /// Current running hash (genesis for an empty ledger).
    pub fn head(&self) -> String {
        self.read_inner()
            .map(|inner| inner.state.running_hash.clone())
            .unwrap_or_else(|_| GENESIS_HASH.to_string())
    }

    /// Number of entries applied since genesis.
    pub fn version(&self) -> u64 {
        self.read_inner()
            .map(|inner| inner.state.version)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.read_inner()
            .map(|inner| inner.state.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read all entries from a ledger file, oldest first. Skips blank lines.
    /// Fails with `Corrupt` on the first line that is not an entry.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<LedgerEntry>, LedgerError> {
        let path = path.as_ref();
        let stored = read_stored(path)?;
        match stored.damage {
            Some(damage) => Err(LedgerError::Corrupt {
                path: path.to_path_buf(),
                line: damage.line,
                reason: damage.reason,
            }),
            None => Ok(stored.entries),
        }
    }

    /// Verify a ledger file without opening it for writing.
    ///
    /// An unreadable line is reported as a chain break at its position.
    /// Only failing to read the file at all is an error.
    pub fn verify_file(
        path: impl AsRef<Path>,
        keys: &[PublicIdentity],
    ) -> Result<ChainReport, LedgerError> {
        let stored = read_stored(path.as_ref())?;
        let report = verify_stored(&stored.entries, stored.damage.as_ref(), keys);
        log_report(&report, Some(path.as_ref()));
        Ok(report)
    }

    fn read_inner(&self) -> Result<RwLockReadGuard<'_, Inner>, LedgerError> {
        self.inner
            .read()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, Inner>, LedgerError> {
        self.inner
            .write()
            .map_err(|e| LedgerError::LockPoisoned(e.to_string()))
    }
}

/// Read entries up to the first line that does not parse.
fn read_stored(path: &Path) -> Result<Stored, LedgerError> {
    let file = File::open(path).map_err(|source| LedgerError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    // Split on bytes: a flipped bit may leave a line that is not UTF-8.
    for (line_num, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|source| LedgerError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<LedgerEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let damage = Damage {
                    position: entries.len() + 1,
                    line: line_num + 1,
                    task_id: salvage_task_id(&line),
                    reason: e.to_string(),
                };
                return Ok(Stored {
                    entries,
                    damage: Some(damage),
                });
            }
        }
    }

    Ok(Stored {
        entries,
        damage: None,
    })
}

/// Best-effort task id from a line that is not a valid entry.
fn salvage_task_id(line: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("taskId")?.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// Append one serialized entry with a single unbuffered write. On failure
/// the file is truncated back to its previous length; if even that fails the
/// ledger is marked damaged so no later append can land after a torn line.
fn append_line(
    inner: &mut Inner,
    line: &str,
    position: usize,
    path: Option<&Path>,
) -> Result<(), LedgerError> {
    let Some(file) = inner.file.as_mut() else {
        return Ok(());
    };
    let committed = file.metadata()?.len();
    let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.sync_data()) else {
        return Ok(());
    };

    if let Err(rollback) = file.set_len(committed) {
        let location = path.map(|p| p.display().to_string()).unwrap_or_default();
        tracing::error!(
            ledger = %location,
            error = %rollback,
            "failed to roll back a partial ledger write; appends are refused"
        );
        inner.damage = Some(Damage {
            position,
            line: position,
            task_id: String::new(),
            reason: format!("partial write: {}", e),
        });
    }
    Err(LedgerError::WriteFailed(e))
}

fn log_report(report: &ChainReport, path: Option<&Path>) {
    let location = path.map(|p| p.display().to_string()).unwrap_or_default();
    match report {
        ChainReport::Intact { entries, .. } => {
            tracing::debug!(entries, ledger = %location, "ledger chain intact")
        }
        ChainReport::ChainBroken(brk) => tracing::error!(
            position = brk.position,
            task_id = %brk.task_id,
            fault = %brk.fault,
            ledger = %location,
            "SECURITY: audit ledger chain broken"
        ),
    }
}
