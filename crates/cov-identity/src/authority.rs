// authority.rs: IdentityAuthority, the installation's Ed25519 signer.
//
// The authority exclusively owns the private key. Other components hold an
// `Arc<IdentityAuthority>` and only ever see public identifiers and
// signatures. Ed25519 signatures are deterministic: the same key and message
// always yield the same 64 bytes.

use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair, UnparsedPublicKey, ED25519};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;
use crate::keystore::Keystore;

/// Raw Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Raw Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// The stable public identifier of a signing key: base64 of the raw
/// 32-byte Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicIdentity(String);

impl PublicIdentity {
    pub fn from_key_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Wrap an already-encoded identifier. The value is not validated here;
    /// malformed identifiers simply never verify.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw key bytes, or `None` if this is not a well-formed Ed25519 key.
    pub fn to_key_bytes(&self) -> Option<Vec<u8>> {
        STANDARD
            .decode(&self.0)
            .ok()
            .filter(|bytes| bytes.len() == PUBLIC_KEY_LEN)
    }
}

impl std::fmt::Display for PublicIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A base64-encoded Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw signature bytes, or `None` if malformed.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        STANDARD
            .decode(&self.0)
            .ok()
            .filter(|bytes| bytes.len() == SIGNATURE_LEN)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Verify `signature` over `message` under `public`.
///
/// Never fails: malformed keys, malformed signatures, wrong keys and
/// mismatched messages all return `false`.
pub fn verify_signature(message: &[u8], signature: &Signature, public: &PublicIdentity) -> bool {
    let (Some(sig), Some(key)) = (signature.to_bytes(), public.to_key_bytes()) else {
        return false;
    };
    UnparsedPublicKey::new(&ED25519, key)
        .verify(message, &sig)
        .is_ok()
}

struct ActiveKey {
    pair: Ed25519KeyPair,
    public: PublicIdentity,
}

impl ActiveKey {
    fn from_pkcs8(pkcs8: &[u8], origin: &Path) -> Result<Self, IdentityError> {
        let pair = Ed25519KeyPair::from_pkcs8(pkcs8).map_err(|e| IdentityError::MalformedKey {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        let public = PublicIdentity::from_key_bytes(pair.public_key().as_ref());
        Ok(Self { pair, public })
    }
}

#[derive(Default)]
struct KeyState {
    current: Option<ActiveKey>,
    retired: Vec<PublicIdentity>,
}

/// Owns the signing keypair for one installation.
///
/// Key state sits behind an `RwLock`: signing takes the read guard, while
/// bootstrap and rotation take the write guard, so a rotation is never
/// observed half-applied.
pub struct IdentityAuthority {
    keystore: Option<Keystore>,
    state: RwLock<KeyState>,
    rng: SystemRandom,
}

impl IdentityAuthority {
    /// An authority with no backing files. Keys live only as long as the value.
    pub fn ephemeral() -> Self {
        Self {
            keystore: None,
            state: RwLock::new(KeyState::default()),
            rng: SystemRandom::new(),
        }
    }

    /// Load whatever key material exists under `dir` without generating any.
    ///
    /// An empty keystore yields an authority whose `sign` fails with
    /// `Unavailable` until `ensure_identity` is called.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let keystore = Keystore::new(dir);
        let mut state = KeyState {
            current: None,
            retired: keystore.read_retired()?,
        };
        if let Some(pkcs8) = keystore.read_private_key()? {
            let key = ActiveKey::from_pkcs8(&pkcs8, &keystore.private_key_path())?;
            tracing::info!(public_key = %key.public, "loaded signing identity");
            // A rotation interrupted after retiring the old key leaves the
            // still-current key on the retired list, possibly more than once.
            state.retired.retain(|retired| *retired != key.public);
            state.current = Some(key);
        }
        state.retired.dedup();
        Ok(Self {
            keystore: Some(keystore),
            state: RwLock::new(state),
            rng: SystemRandom::new(),
        })
    }

    /// Load the keystore under `dir` and bootstrap an identity if it is empty.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let authority = Self::load(dir)?;
        authority.ensure_identity()?;
        Ok(authority)
    }

    /// Return the current public identity, generating a keypair on first use.
    ///
    /// Idempotent. If another process wrote key material after this authority
    /// was loaded, that key is adopted rather than replaced.
    pub fn ensure_identity(&self) -> Result<PublicIdentity, IdentityError> {
        let mut state = self.write_state()?;
        if let Some(key) = &state.current {
            return Ok(key.public.clone());
        }

        let key = match &self.keystore {
            Some(store) => match store.read_private_key()? {
                Some(pkcs8) => ActiveKey::from_pkcs8(&pkcs8, &store.private_key_path())?,
                None => {
                    let (pkcs8, key) = self.generate()?;
                    match store.write_new(&pkcs8, &key.public) {
                        Ok(()) => key,
                        Err(IdentityError::AlreadyExists { path }) => {
                            let pkcs8 = store
                                .read_private_key()?
                                .ok_or(IdentityError::Unavailable)?;
                            ActiveKey::from_pkcs8(&pkcs8, &path)?
                        }
                        Err(e) => return Err(e),
                    }
                }
            },
            None => self.generate()?.1,
        };

        tracing::info!(public_key = %key.public, "signing identity ready");
        let public = key.public.clone();
        state.current = Some(key);
        Ok(public)
    }

    /// Replace the keypair unconditionally.
    ///
    /// Future signatures use the new key. Signatures made under the previous
    /// key still verify against the previous public identity, which is moved
    /// to the retired list. No transition record is written anywhere else.
    ///
    /// On error nothing changes in memory and the stored current key is
    /// still the previous one.
    pub fn rotate_identity(&self) -> Result<PublicIdentity, IdentityError> {
        let mut state = self.write_state()?;
        let (pkcs8, key) = self.generate()?;

        // Retire before replacing: a key that has signed anything must be
        // listed on disk before it stops being current.
        if let Some(store) = &self.keystore {
            if let Some(previous) = &state.current {
                store.append_retired(&previous.public)?;
            }
            store.replace(&pkcs8, &key.public)?;
        }

        if let Some(previous) = state.current.take() {
            tracing::info!(
                retired = %previous.public,
                public_key = %key.public,
                "rotated signing identity"
            );
            state.retired.push(previous.public);
        } else {
            tracing::info!(public_key = %key.public, "generated signing identity on rotation");
        }

        let public = key.public.clone();
        state.current = Some(key);
        Ok(public)
    }

    /// Sign `message` with the current key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, IdentityError> {
        let state = self.read_state()?;
        let key = state.current.as_ref().ok_or(IdentityError::Unavailable)?;
        tracing::debug!(len = message.len(), "signing payload");
        Ok(Signature::from_bytes(key.pair.sign(message).as_ref()))
    }

    /// Verify a signature against any public identity. Never fails.
    pub fn verify(&self, message: &[u8], signature: &Signature, public: &PublicIdentity) -> bool {
        verify_signature(message, signature, public)
    }

    /// The current public identity, if key material is loaded.
    pub fn public_identity(&self) -> Option<PublicIdentity> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.current.as_ref().map(|key| key.public.clone()))
    }

    /// The current public identity, failing with `Unavailable` if none is loaded.
    pub fn require_public_identity(&self) -> Result<PublicIdentity, IdentityError> {
        let state = self.read_state()?;
        state
            .current
            .as_ref()
            .map(|key| key.public.clone())
            .ok_or(IdentityError::Unavailable)
    }

    /// Public identities retired by rotation, oldest first.
    pub fn retired_identities(&self) -> Vec<PublicIdentity> {
        self.state
            .read()
            .map(|state| state.retired.clone())
            .unwrap_or_default()
    }

    /// Current identity (if any) followed by retired identities, newest first.
    pub fn known_identities(&self) -> Vec<PublicIdentity> {
        let Ok(state) = self.state.read() else {
            return Vec::new();
        };
        state
            .current
            .iter()
            .map(|key| key.public.clone())
            .chain(state.retired.iter().rev().cloned())
            .collect()
    }

    pub fn keystore(&self) -> Option<&Keystore> {
        self.keystore.as_ref()
    }

    fn generate(&self) -> Result<(Vec<u8>, ActiveKey), IdentityError> {
        let document =
            Ed25519KeyPair::generate_pkcs8(&self.rng).map_err(|_| IdentityError::KeyGeneration)?;
        let pkcs8 = document.as_ref().to_vec();
        let pair = Ed25519KeyPair::from_pkcs8(&pkcs8).map_err(|e| IdentityError::MalformedKey {
            path: Default::default(),
            reason: e.to_string(),
        })?;
        let public = PublicIdentity::from_key_bytes(pair.public_key().as_ref());
        Ok((pkcs8, ActiveKey { pair, public }))
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, KeyState>, IdentityError> {
        self.state
            .read()
            .map_err(|e| IdentityError::LockPoisoned(e.to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, KeyState>, IdentityError> {
        self.state
            .write()
            .map_err(|e| IdentityError::LockPoisoned(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn flip_bit(bytes: &mut [u8], bit: usize) {
        bytes[bit / 8] ^= 1 << (bit % 8);
    }

    #[test]
    fn sign_fails_without_identity() {
        let authority = IdentityAuthority::ephemeral();
        assert!(matches!(
            authority.sign(b"payload"),
            Err(IdentityError::Unavailable)
        ));
        assert!(authority.public_identity().is_none());
        assert!(matches!(
            authority.require_public_identity(),
            Err(IdentityError::Unavailable)
        ));
    }

    #[test]
    fn ensure_identity_is_idempotent() {
        let dir = tempdir().unwrap();
        let authority = IdentityAuthority::load(dir.path()).unwrap();
        let first = authority.ensure_identity().unwrap();
        let second = authority.ensure_identity().unwrap();
        assert_eq!(first, second);

        // A fresh authority over the same keystore sees the same key.
        let reloaded = IdentityAuthority::open(dir.path()).unwrap();
        assert_eq!(reloaded.public_identity(), Some(first));
    }

    #[test]
    fn ensure_identity_adopts_key_written_by_another_instance() {
        let dir = tempdir().unwrap();
        let late = IdentityAuthority::load(dir.path()).unwrap();
        let early = IdentityAuthority::open(dir.path()).unwrap();
        assert_eq!(late.ensure_identity().unwrap(), early.public_identity().unwrap());
    }

    #[test]
    fn rotation_yields_new_identity_and_retires_old() {
        let dir = tempdir().unwrap();
        let authority = IdentityAuthority::open(dir.path()).unwrap();
        let before = authority.public_identity().unwrap();
        let after = authority.rotate_identity().unwrap();
        assert_ne!(before, after);
        assert_eq!(authority.retired_identities(), vec![before.clone()]);
        assert_eq!(authority.known_identities(), vec![after.clone(), before.clone()]);

        let reloaded = IdentityAuthority::load(dir.path()).unwrap();
        assert_eq!(reloaded.public_identity(), Some(after));
        assert_eq!(reloaded.retired_identities(), vec![before]);
    }

    #[test]
    fn failed_rotation_keeps_signing_and_stored_key_in_step() {
        let dir = tempdir().unwrap();
        let authority = IdentityAuthority::open(dir.path()).unwrap();
        let old = authority.public_identity().unwrap();
        let retired_path = authority.keystore().unwrap().retired_keys_path();
        std::fs::create_dir(&retired_path).unwrap();

        assert!(matches!(
            authority.rotate_identity(),
            Err(IdentityError::Io { .. })
        ));
        assert_eq!(authority.public_identity(), Some(old.clone()));
        let sig = authority.sign(b"signed after failed rotation").unwrap();

        std::fs::remove_dir(&retired_path).unwrap();
        let reloaded = IdentityAuthority::load(dir.path()).unwrap();
        assert_eq!(reloaded.public_identity(), Some(old.clone()));
        assert!(reloaded
            .known_identities()
            .iter()
            .any(|key| reloaded.verify(b"signed after failed rotation", &sig, key)));
    }

    #[test]
    fn current_key_on_retired_list_is_dropped_on_load() {
        let dir = tempdir().unwrap();
        let authority = IdentityAuthority::open(dir.path()).unwrap();
        let current = authority.public_identity().unwrap();
        let store = authority.keystore().unwrap();
        // Left behind by a rotation that retired the key, then failed twice.
        store.append_retired(&current).unwrap();
        store.append_retired(&current).unwrap();

        let reloaded = IdentityAuthority::load(dir.path()).unwrap();
        assert!(reloaded.retired_identities().is_empty());
        assert_eq!(reloaded.known_identities(), vec![current.clone()]);

        let rotated = reloaded.rotate_identity().unwrap();
        let again = IdentityAuthority::load(dir.path()).unwrap();
        assert_eq!(again.public_identity(), Some(rotated));
        assert_eq!(again.retired_identities(), vec![current]);
    }

    #[test]
    fn old_signatures_verify_only_against_old_key() {
        let authority = IdentityAuthority::ephemeral();
        let old_key = authority.ensure_identity().unwrap();
        let old_sig = authority.sign(b"record").unwrap();
        let new_key = authority.rotate_identity().unwrap();

        assert!(authority.verify(b"record", &old_sig, &old_key));
        assert!(!authority.verify(b"record", &old_sig, &new_key));
        let new_sig = authority.sign(b"record").unwrap();
        assert!(!authority.verify(b"record", &new_sig, &old_key));
    }

    #[test]
    fn sign_verify_round_trip_and_determinism() {
        let authority = IdentityAuthority::ephemeral();
        let public = authority.ensure_identity().unwrap();
        for message in [&b""[..], b"a", b"transfer 20 to savings"] {
            let sig = authority.sign(message).unwrap();
            assert_eq!(sig, authority.sign(message).unwrap());
            assert!(authority.verify(message, &sig, &public));
        }
    }

    #[test]
    fn single_bit_mutations_fail_verification() {
        let authority = IdentityAuthority::ephemeral();
        let public = authority.ensure_identity().unwrap();
        let message = b"send the quarterly report".to_vec();
        let sig = authority.sign(&message).unwrap();

        for bit in 0..message.len() * 8 {
            let mut mutated = message.clone();
            flip_bit(&mut mutated, bit);
            assert!(!authority.verify(&mutated, &sig, &public), "message bit {bit}");
        }

        let sig_bytes = sig.to_bytes().unwrap();
        for bit in 0..SIGNATURE_LEN * 8 {
            let mut mutated = sig_bytes.clone();
            flip_bit(&mut mutated, bit);
            let mutated = Signature::from_bytes(&mutated);
            assert!(!authority.verify(&message, &mutated, &public), "signature bit {bit}");
        }
    }

    #[test]
    fn verify_rejects_malformed_inputs() {
        let authority = IdentityAuthority::ephemeral();
        let public = authority.ensure_identity().unwrap();
        let sig = authority.sign(b"m").unwrap();

        assert!(!verify_signature(b"m", &Signature::from_encoded("not base64!"), &public));
        assert!(!verify_signature(b"m", &Signature::from_bytes(&[0u8; 10]), &public));
        assert!(!verify_signature(b"m", &sig, &PublicIdentity::from_encoded("")));
        assert!(!verify_signature(
            b"m",
            &sig,
            &PublicIdentity::from_key_bytes(&[7u8; PUBLIC_KEY_LEN])
        ));
    }

    #[test]
    fn load_rejects_corrupt_key_file() {
        let dir = tempdir().unwrap();
        let store = Keystore::new(dir.path());
        store
            .write_new(b"not a pkcs8 document", &PublicIdentity::from_encoded("x"))
            .unwrap();
        assert!(matches!(
            IdentityAuthority::load(dir.path()),
            Err(IdentityError::MalformedKey { .. })
        ));
    }
}
