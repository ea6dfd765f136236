// scope.rs: Capability and vault scope checks.
//
// A manifest names the tools an action may invoke (`capabilityScope`) and the
// isolated data domains it may touch (`vaultScope`). Executors call these
// checks before each tool invocation. Entries are glob patterns, so
// "gmail.*" grants every gmail tool. Default deny: an empty scope grants
// nothing.

use cov_manifest::ExecutionManifest;
use glob::Pattern;

/// Whether `tool` is covered by the manifest's capability scope.
pub fn permits_capability(manifest: &ExecutionManifest, tool: &str) -> bool {
    let permitted = matches_any(manifest.capability_scope(), tool);
    if !permitted {
        tracing::warn!(
            execution_id = %manifest.execution_id(),
            tool,
            "tool outside capability scope"
        );
    }
    permitted
}

/// Whether `vault` is covered by the manifest's vault scope.
///
/// Vault names containing traversal sequences are always denied.
pub fn permits_vault(manifest: &ExecutionManifest, vault: &str) -> bool {
    if contains_path_traversal(vault) {
        tracing::warn!(
            execution_id = %manifest.execution_id(),
            vault,
            "path traversal in vault name"
        );
        return false;
    }
    let permitted = matches_any(manifest.vault_scope(), vault);
    if !permitted {
        tracing::warn!(
            execution_id = %manifest.execution_id(),
            vault,
            "vault outside scope"
        );
    }
    permitted
}

fn matches_any(patterns: &[String], target: &str) -> bool {
    patterns.iter().any(|p| matches_pattern(p, target))
}

/// Invalid patterns never match (fail-closed, not fail-open).
fn matches_pattern(pattern: &str, target: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(target),
        Err(_) => false,
    }
}

fn contains_path_traversal(name: &str) -> bool {
    name.contains("..") || name.contains("%2e%2e") || name.contains("%2E%2E")
}
