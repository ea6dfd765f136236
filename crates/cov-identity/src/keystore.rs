// keystore.rs: On-disk key material.
//
// Layout under the keystore directory:
//
//   identity.pk8   PKCS#8 v2 DER Ed25519 private key (0600 on Unix)
//   identity.pub   base64 of the raw 32-byte public key
//   retired.pub    one base64 public key per line, oldest first
//
// PKCS#8 and raw Ed25519 public keys are both readable by standard tooling
// (openssl, ssh-keygen conversions, libsodium), so independent verifiers can
// check signatures without this crate.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::authority::PublicIdentity;
use crate::error::IdentityError;

const PRIVATE_KEY_FILE: &str = "identity.pk8";
const PUBLIC_KEY_FILE: &str = "identity.pub";
const RETIRED_KEYS_FILE: &str = "retired.pub";

/// File-backed storage for one installation's key material.
#[derive(Debug, Clone)]
pub struct Keystore {
    dir: PathBuf,
}

impl Keystore {
    /// Create a keystore rooted at `dir`. Nothing is touched on disk until a write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.dir.join(PUBLIC_KEY_FILE)
    }

    pub fn retired_keys_path(&self) -> PathBuf {
        self.dir.join(RETIRED_KEYS_FILE)
    }

    /// Whether private key material is present.
    pub fn has_key(&self) -> bool {
        self.private_key_path().exists()
    }

    /// Read the PKCS#8 private key, or `None` if the keystore is empty.
    pub fn read_private_key(&self) -> Result<Option<Vec<u8>>, IdentityError> {
        let path = self.private_key_path();
        if !path.exists() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .map_err(|source| IdentityError::Io { path, source })
    }

    /// Write a first keypair. Fails with `AlreadyExists` rather than replacing
    /// key material that appeared since the caller last looked.
    ///
    /// The private key is staged in a temp file and linked into place only
    /// once fully written, so `identity.pk8` is never partial.
    pub fn write_new(
        &self,
        pkcs8: &[u8],
        public: &PublicIdentity,
    ) -> Result<(), IdentityError> {
        self.ensure_dir()?;
        let path = self.private_key_path();
        let staged = self.stage_private(pkcs8)?;
        if let Err(e) = staged.persist_noclobber(&path) {
            return Err(match e.error.kind() {
                ErrorKind::AlreadyExists => IdentityError::AlreadyExists { path },
                _ => IdentityError::Io {
                    path,
                    source: e.error,
                },
            });
        }
        self.write_public(public);
        Ok(())
    }

    /// Replace the current keypair. The new private key is staged in a temp
    /// file and renamed over the old one, so a crash never leaves a
    /// truncated key behind.
    pub fn replace(&self, pkcs8: &[u8], public: &PublicIdentity) -> Result<(), IdentityError> {
        self.ensure_dir()?;
        let path = self.private_key_path();
        let staged = self.stage_private(pkcs8)?;
        staged.persist(&path).map_err(|e| IdentityError::Io {
            path,
            source: e.error,
        })?;
        self.write_public(public);
        Ok(())
    }

    /// Read the list of retired public identities, oldest first.
    pub fn read_retired(&self) -> Result<Vec<PublicIdentity>, IdentityError> {
        let path = self.retired_keys_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content =
            fs::read_to_string(&path).map_err(|source| IdentityError::Io { path, source })?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PublicIdentity::from_encoded)
            .collect())
    }

    /// Append a public identity to the retired list and sync it to disk.
    pub fn append_retired(&self, public: &PublicIdentity) -> Result<(), IdentityError> {
        self.ensure_dir()?;
        let path = self.retired_keys_path();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| IdentityError::Io {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{}", public.as_str())
            .and_then(|_| file.sync_all())
            .map_err(|source| IdentityError::Io { path, source })
    }

    /// Write `pkcs8` to an owner-only temp file in the keystore directory.
    /// The file is deleted if it is dropped before being persisted.
    fn stage_private(&self, pkcs8: &[u8]) -> Result<NamedTempFile, IdentityError> {
        let staged = NamedTempFile::new_in(&self.dir).map_err(|source| IdentityError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let io_err = |source: std::io::Error| IdentityError::Io {
            path: staged.path().to_path_buf(),
            source,
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }
        let mut file = staged.as_file();
        file.write_all(pkcs8)
            .and_then(|_| file.sync_all())
            .map_err(io_err)?;
        Ok(staged)
    }

    /// `identity.pub` is derived from the private key and only exported for
    /// outside verifiers, so failing to write it does not undo a key write.
    fn write_public(&self, public: &PublicIdentity) {
        let path = self.public_key_path();
        if let Err(e) = fs::write(&path, format!("{}\n", public.as_str())) {
            tracing::warn!(path = %path.display(), error = %e, "failed to export public key");
        }
    }

    fn ensure_dir(&self) -> Result<(), IdentityError> {
        fs::create_dir_all(&self.dir).map_err(|source| IdentityError::Io {
            path: self.dir.clone(),
            source,
        })
    }
}
