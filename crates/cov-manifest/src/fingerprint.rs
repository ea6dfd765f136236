// fingerprint.rs: Stable identifier for the issuing device.
//
// The fingerprint only has to be stable per machine and opaque; it is not a
// security boundary. It hashes the OS, CPU architecture, and the systemd
// machine id when one is readable.

use std::path::Path;

use cov_identity::hasher;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Fingerprint this machine.
pub fn detect() -> String {
    let machine_id = MACHINE_ID_PATHS
        .iter()
        .find_map(|p| read_trimmed(Path::new(p)));
    from_parts(
        std::env::consts::OS,
        std::env::consts::ARCH,
        machine_id.as_deref(),
    )
}

/// Fingerprint from explicit components.
pub fn from_parts(os: &str, arch: &str, machine_id: Option<&str>) -> String {
    let material = format!("os={}\narch={}\nmachine={}", os, arch, machine_id.unwrap_or("-"));
    hasher::hash_str(&material)
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
