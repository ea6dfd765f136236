// config.rs: Where Covenant keeps its state, and how it issues manifests.
//
// `CovenantConfig::for_home()` lays out the standard paths under a home
// directory (default `~/.covenant`):
//
//   <home>/config.toml     optional settings (see `Settings`)
//   <home>/identity/       keystore (identity.pk8, identity.pub, retired.pub)
//   <home>/ledger.jsonl    audit ledger

use std::path::{Path, PathBuf};

use cov_manifest::{fingerprint, ManifestServiceConfig, DEFAULT_TTL_MINUTES};
use serde::{Deserialize, Serialize};

/// Resolved paths plus the settings read from `config.toml`.
#[derive(Debug, Clone)]
pub struct CovenantConfig {
    pub home: PathBuf,
    pub identity_dir: PathBuf,
    pub ledger_path: PathBuf,
    pub settings: Settings,
}

impl CovenantConfig {
    /// Standard layout under `home`, reading `config.toml` if present.
    pub fn for_home(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref().to_path_buf();
        let settings = Settings::load_or_default(&home.join("config.toml"));
        Self {
            identity_dir: home.join("identity"),
            ledger_path: home.join("ledger.jsonl"),
            home,
            settings,
        }
    }

    /// `~/.covenant`, or `./.covenant` if no home directory can be found.
    pub fn default_home() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".covenant")
    }

    /// Issuance settings for the manifest service. Fails if the configured
    /// TTL is out of range.
    pub fn manifest_service_config(&self) -> anyhow::Result<ManifestServiceConfig> {
        let defaults = ManifestServiceConfig::default();
        Ok(ManifestServiceConfig {
            ttl: self.settings.manifest_ttl()?,
            planner_version: self
                .settings
                .planner_version
                .clone()
                .unwrap_or(defaults.planner_version),
            model_version: self
                .settings
                .model_version
                .clone()
                .unwrap_or(defaults.model_version),
            device_fingerprint: self
                .settings
                .device_fingerprint
                .clone()
                .unwrap_or_else(fingerprint::detect),
        })
    }
}

/// Contents of `<home>/config.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Manifest lifetime in seconds. Default: 900 (15 minutes).
    /// Must be between 1 and `MAX_MANIFEST_TTL_SECS`.
    #[serde(default = "default_manifest_ttl_secs")]
    pub manifest_ttl_secs: i64,

    /// Overrides the planner version stamped into manifests.
    #[serde(default)]
    pub planner_version: Option<String>,

    /// Overrides the model version stamped into manifests.
    #[serde(default)]
    pub model_version: Option<String>,

    /// Overrides the detected device fingerprint.
    #[serde(default)]
    pub device_fingerprint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            manifest_ttl_secs: default_manifest_ttl_secs(),
            planner_version: None,
            model_version: None,
            device_fingerprint: None,
        }
    }
}

/// Longest manifest lifetime a config file may request: one hour. The TTL
/// bounds the replay window of a leaked manifest.
pub const MAX_MANIFEST_TTL_SECS: i64 = 60 * 60;

fn default_manifest_ttl_secs() -> i64 {
    DEFAULT_TTL_MINUTES * 60
}

impl Settings {
    /// Load settings from a TOML file, rejecting out-of-range values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = Self::parse(path)?;
        settings.manifest_ttl()?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults if the file is missing or
    /// unparsable. An out-of-range TTL falls back to the default TTL alone.
    /// Both are logged.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        let mut settings = match Self::parse(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                return Self::default();
            }
        };
        if let Err(e) = settings.manifest_ttl() {
            tracing::warn!(
                path = %path.display(),
                manifest_ttl_secs = settings.manifest_ttl_secs,
                error = %e,
                "ignoring out-of-range manifest TTL"
            );
            settings.manifest_ttl_secs = default_manifest_ttl_secs();
        }
        settings
    }

    /// The manifest lifetime as a duration.
    pub fn manifest_ttl(&self) -> anyhow::Result<chrono::Duration> {
        let secs = self.manifest_ttl_secs;
        if !(1..=MAX_MANIFEST_TTL_SECS).contains(&secs) {
            anyhow::bail!(
                "manifest_ttl_secs must be between 1 and {}, got {}",
                MAX_MANIFEST_TTL_SECS,
                secs
            );
        }
        chrono::Duration::try_seconds(secs)
            .ok_or_else(|| anyhow::anyhow!("manifest_ttl_secs out of range: {}", secs))
    }

    fn parse(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}
