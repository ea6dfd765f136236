// entry.rs: Ledger entry data model and the bytes it is signed and chained over.
//
// Each entry records that an authorized action was executed:
//
//   actionHash   = sha256(canonicalize(actionPayload))
//   signature    = sign(signing_payload(executionId, taskId, timestamp, actionHash))
//   previousHash = running chain hash before this entry
//
// and after appending, running hash = sha256(runningHash ∥ canonicalize(entry)).
//
// The signing payload is length-prefixed (u64 big-endian per field, after a
// domain tag) so that no choice of field contents can shift bytes across a
// field boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use cov_identity::{canonical_bytes, hasher, Signature};
use serde::{Deserialize, Serialize};

/// Running hash before the first entry: a SHA-256-length string of zeros.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Domain separation tag prefixed to every entry signing payload.
pub const SIGNING_DOMAIN: &[u8] = b"covenant.ledger-entry.v1";

/// One executed, authorized action. One line in the JSONL ledger file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// The manifest execution id this action ran under.
    pub execution_id: String,
    /// The planner's task identifier within the execution.
    pub task_id: String,
    /// When the entry was recorded (UTC).
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the canonical action payload.
    pub action_hash: String,
    /// Identity signature over the signing payload.
    pub signature: Signature,
    /// Running chain hash before this entry was appended.
    pub previous_hash: String,
}

impl LedgerEntry {
    /// The bytes this entry's signature covers.
    pub fn signing_payload(&self) -> Vec<u8> {
        signing_payload(
            &self.execution_id,
            &self.task_id,
            &self.timestamp,
            &self.action_hash,
        )
    }
}

/// Length-prefixed encoding of the signed fields.
pub fn signing_payload(
    execution_id: &str,
    task_id: &str,
    timestamp: &DateTime<Utc>,
    action_hash: &str,
) -> Vec<u8> {
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
    let fields: [&[u8]; 4] = [
        execution_id.as_bytes(),
        task_id.as_bytes(),
        timestamp.as_bytes(),
        action_hash.as_bytes(),
    ];

    let mut out = Vec::with_capacity(
        SIGNING_DOMAIN.len() + fields.iter().map(|f| 8 + f.len()).sum::<usize>(),
    );
    out.extend_from_slice(SIGNING_DOMAIN);
    for field in fields {
        out.extend_from_slice(&(field.len() as u64).to_be_bytes());
        out.extend_from_slice(field);
    }
    out
}

/// Hash an opaque action payload in its canonical form.
pub fn action_hash<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    Ok(hasher::hash_bytes(&canonical_bytes(payload)?))
}

/// The running hash after appending `entry` to a chain whose head is `running`.
pub fn chain_link(running: &str, entry: &LedgerEntry) -> Result<String, serde_json::Error> {
    let canonical = canonical_bytes(entry)?;
    Ok(hasher::hash_concat(&[running.as_bytes(), &canonical]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> LedgerEntry {
        LedgerEntry {
            execution_id: "0190f2a4-0000-7000-8000-000000000001".to_string(),
            task_id: "step_1".to_string(),
            timestamp: "2026-10-19T09:30:00Z".parse().unwrap(),
            action_hash: action_hash(&json!({"tool": "gmail.send"})).unwrap(),
            signature: Signature::from_encoded("sig"),
            previous_hash: GENESIS_HASH.to_string(),
        }
    }

    #[test]
    fn genesis_has_digest_length() {
        assert_eq!(GENESIS_HASH.len(), hasher::HEX_DIGEST_LEN);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn payload_is_unambiguous_across_field_boundaries() {
        let ts: DateTime<Utc> = "2026-10-19T09:30:00Z".parse().unwrap();
        // Colon-joining would render both as "a:b:c:<ts>:h".
        let a = signing_payload("a:b", "c", &ts, "h");
        let b = signing_payload("a", "b:c", &ts, "h");
        assert_ne!(a, b);
    }

    #[test]
    fn payload_layout() {
        let ts: DateTime<Utc> = "2026-10-19T09:30:00Z".parse().unwrap();
        let payload = signing_payload("e", "t", &ts, "h");
        assert!(payload.starts_with(SIGNING_DOMAIN));
        let rest = &payload[SIGNING_DOMAIN.len()..];
        assert_eq!(&rest[..8], &1u64.to_be_bytes());
        assert_eq!(rest[8], b'e');
    }

    #[test]
    fn action_hash_ignores_key_order() {
        let a = action_hash(&json!({"to": "bob", "body": "hi"})).unwrap();
        let b = action_hash(&json!({"body": "hi", "to": "bob"})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, action_hash(&json!({"body": "hi", "to": "eve"})).unwrap());
    }

    #[test]
    fn chain_link_depends_on_every_field() {
        let base = entry();
        let link = chain_link(GENESIS_HASH, &base).unwrap();

        let mut changed = base.clone();
        changed.task_id = "step_2".to_string();
        assert_ne!(chain_link(GENESIS_HASH, &changed).unwrap(), link);

        let mut changed = base.clone();
        changed.previous_hash = "f".repeat(64);
        assert_ne!(chain_link(GENESIS_HASH, &changed).unwrap(), link);

        assert_ne!(chain_link(&"1".repeat(64), &base).unwrap(), link);
    }

    #[test]
    fn entry_serializes_camel_case() {
        let json = serde_json::to_value(entry()).unwrap();
        for key in [
            "executionId",
            "taskId",
            "timestamp",
            "actionHash",
            "signature",
            "previousHash",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
