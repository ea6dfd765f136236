// authorization_flow.rs: End-to-end integration test for one authorized execution.
//
// Flow:
//   1. Bootstrap a signing identity in a fresh state directory
//   2. Issue a SOVEREIGN manifest and round-trip it through a JSON file
//   3. Evaluate actions against the policy under a depleted affective state
//   4. Check tool and vault scope before "executing"
//   5. Record executed actions in the ledger, rotating the key midway
//   6. Reload everything from disk and verify the chain
//   7. Tamper with the manifest and the ledger and watch both get caught
//
// This proves: manifest → policy → scope → ledger holds together across
// process restarts and key rotation.

use std::fs;
use std::sync::Arc;

use cov_audit::{AuditLedger, ChainFault};
use cov_identity::IdentityAuthority;
use cov_manifest::{
    AutonomyLevel, Disposition, ManifestRequest, ManifestService, ManifestServiceConfig,
    RejectReason, SignedManifest, Validation,
};
use cov_policy::{permits_capability, permits_vault, AceStateVector, AutonomyPolicyEngine};
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn manifest_policy_ledger_flow() {
    // =========================================================
    // 1. Bootstrap a signing identity
    // =========================================================

    let home = TempDir::new().unwrap();
    let identity_dir = home.path().join("identity");
    let ledger_path = home.path().join("ledger.jsonl");

    let identity = Arc::new(IdentityAuthority::open(&identity_dir).unwrap());
    let first_key = identity.require_public_identity().unwrap();
    assert!(identity_dir.join("identity.pk8").exists());
    assert!(identity_dir.join("identity.pub").exists());

    // Bootstrap is idempotent across instances.
    let again = IdentityAuthority::open(&identity_dir).unwrap();
    assert_eq!(again.public_identity(), Some(first_key.clone()));

    // =========================================================
    // 2. Issue a manifest and round-trip it through disk
    // =========================================================

    let config = ManifestServiceConfig {
        device_fingerprint: "integration-test-device".to_string(),
        ..ManifestServiceConfig::default()
    };
    let service = ManifestService::new(identity.clone(), config);
    let signed = service
        .create(
            ManifestRequest::new("reply to the landlord about the lease", AutonomyLevel::Sovereign)
                .with_capability("gmail.*")
                .with_vault("housing"),
        )
        .unwrap();

    let manifest_path = home.path().join("manifest.json");
    fs::write(&manifest_path, serde_json::to_string_pretty(&signed).unwrap()).unwrap();
    let loaded: SignedManifest =
        serde_json::from_str(&fs::read_to_string(&manifest_path).unwrap()).unwrap();
    assert_eq!(loaded, signed);
    assert_eq!(service.validate(&loaded), Validation::Valid);
    assert_eq!(
        service.validate_trusted(&loaded, &identity.known_identities()),
        Validation::Valid
    );

    // =========================================================
    // 3. Policy under a depleted affective state
    // =========================================================

    // threshold = 90 * 0.3 * max(0.2, 1 - 0.8) = 5.4
    let tired = AceStateVector::new(0.3, 0.1, 0.8).unwrap();
    let engine = AutonomyPolicyEngine::new();
    assert!(!engine.evaluate(&loaded.manifest, 6.0, &tired));
    assert!(engine.evaluate(&loaded.manifest, 5.0, &tired));
    assert!(engine.evaluate(&loaded.manifest, 80.0, &AceStateVector::nominal()));

    // =========================================================
    // 4. Scope checks
    // =========================================================

    assert!(permits_capability(&loaded.manifest, "gmail.send"));
    assert!(!permits_capability(&loaded.manifest, "bank.transfer"));
    assert!(permits_vault(&loaded.manifest, "housing"));
    assert!(!permits_vault(&loaded.manifest, "health"));

    // =========================================================
    // 5. Record executed actions, rotating the key midway
    // =========================================================

    let execution_id = loaded.execution_id().to_string();
    {
        let ledger = AuditLedger::open(&ledger_path, identity.clone()).unwrap();
        ledger
            .record_entry(
                &*execution_id,
                "step_1",
                &json!({"tool": "gmail.search", "query": "lease"}),
            )
            .unwrap();
        ledger
            .record_entry(
                &*execution_id,
                "step_2",
                &json!({"tool": "gmail.draft", "to": "landlord@example.com"}),
            )
            .unwrap();

        let second_key = identity.rotate_identity().unwrap();
        assert_ne!(second_key, first_key);

        ledger
            .record_entry(
                &*execution_id,
                "step_3",
                &json!({"tool": "gmail.send", "draft": 1}),
            )
            .unwrap();
        assert!(ledger.verify_chain().is_intact());
    }

    // Manifests signed before rotation still verify under their embedded key.
    assert!(service.validate(&loaded).is_valid());

    // =========================================================
    // 6. Reload from disk and verify
    // =========================================================

    let reloaded = Arc::new(IdentityAuthority::load(&identity_dir).unwrap());
    assert_eq!(reloaded.retired_identities(), vec![first_key.clone()]);

    let ledger = AuditLedger::open(&ledger_path, reloaded.clone()).unwrap();
    assert_eq!(ledger.len(), 3);
    let report = ledger.verify_chain();
    assert!(report.is_intact(), "{:?}", report);

    let history = ledger.get_history();
    assert!(history.iter().all(|e| e.execution_id == execution_id));
    assert_eq!(
        history.iter().map(|e| e.task_id.as_str()).collect::<Vec<_>>(),
        vec!["step_1", "step_2", "step_3"]
    );
    drop(ledger);

    // =========================================================
    // 7. Tampering is caught
    // =========================================================

    // Manifest: rewrite the objective text.
    let mut forged: Value = serde_json::to_value(&loaded).unwrap();
    forged["manifest"]["objective"]["raw"] = Value::from("wire the deposit to a new account");
    let forged: SignedManifest = serde_json::from_value(forged).unwrap();
    let validation = service.validate(&forged);
    assert_eq!(validation, Validation::Rejected(RejectReason::Tampered));
    assert_eq!(
        validation.reason().map(|r| r.disposition()),
        Some(Disposition::Escalate)
    );

    // Ledger: rewrite the action hash of the second entry.
    let content = fs::read_to_string(&ledger_path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut entry: Value = serde_json::from_str(&lines[1]).unwrap();
    entry["actionHash"] = Value::from("0".repeat(64));
    lines[1] = serde_json::to_string(&entry).unwrap();
    fs::write(&ledger_path, lines.join("\n") + "\n").unwrap();

    let report = AuditLedger::verify_file(&ledger_path, &reloaded.known_identities()).unwrap();
    let brk = report.broken_at().expect("tampered ledger must not verify");
    assert_eq!(brk.position, 2);
    assert_eq!(brk.task_id, "step_2");
    assert_eq!(brk.fault, ChainFault::SignatureInvalid);
}
