//! Device-local private key storage.
//!
//! The vault is an injected capability: the protocol logic only ever sees
//! the [`KeyVault`] trait, so tests run against [`MemoryVault`] and a
//! desktop build ships [`FileVault`] (or a platform keychain behind the
//! same trait). Keys are stored per identity id -- a second identity signed
//! in on the same device can neither read nor overwrite the first's key.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::sync::Mutex;
use tracing::warn;

use causette_shared::identity::{IdentityKeyExport, IdentityKeyPair};
use causette_shared::types::IdentityId;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// No key stored for this identity on this device.
    #[error("No key stored for this identity")]
    NotFound,

    /// Stored bytes did not deserialize. The entry is purged before this
    /// is returned; an unusable key is never silently retained.
    #[error("Stored key bytes are corrupt")]
    Corrupt,

    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait KeyVault: Send + Sync {
    async fn put(&self, id: &IdentityId, keypair: &IdentityKeyPair) -> Result<(), VaultError>;

    async fn get(&self, id: &IdentityId) -> Result<IdentityKeyPair, VaultError>;

    async fn delete(&self, id: &IdentityId) -> Result<(), VaultError>;
}

fn encode_keypair(keypair: &IdentityKeyPair) -> Vec<u8> {
    // IdentityKeyExport is two fixed arrays; serialization cannot fail.
    bincode::serialize(&keypair.to_export()).unwrap_or_default()
}

fn decode_keypair(bytes: &[u8]) -> Result<IdentityKeyPair, VaultError> {
    let export: IdentityKeyExport =
        bincode::deserialize(bytes).map_err(|_| VaultError::Corrupt)?;
    Ok(IdentityKeyPair::from_export(&export))
}

// ---------------------------------------------------------------------------
// In-memory vault
// ---------------------------------------------------------------------------

/// HashMap-backed vault for tests and embedding.
#[derive(Default)]
pub struct MemoryVault {
    keys: Mutex<HashMap<IdentityId, Vec<u8>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn poison(&self, id: &IdentityId) {
        self.keys
            .lock()
            .await
            .insert(id.clone(), vec![0xDE, 0xAD]);
    }
}

#[async_trait]
impl KeyVault for MemoryVault {
    async fn put(&self, id: &IdentityId, keypair: &IdentityKeyPair) -> Result<(), VaultError> {
        self.keys
            .lock()
            .await
            .insert(id.clone(), encode_keypair(keypair));
        Ok(())
    }

    async fn get(&self, id: &IdentityId) -> Result<IdentityKeyPair, VaultError> {
        let mut keys = self.keys.lock().await;
        let bytes = keys.get(id).ok_or(VaultError::NotFound)?;
        match decode_keypair(bytes) {
            Ok(keypair) => Ok(keypair),
            Err(err) => {
                warn!(identity = %id, "purging corrupt vault entry");
                keys.remove(id);
                Err(err)
            }
        }
    }

    async fn delete(&self, id: &IdentityId) -> Result<(), VaultError> {
        self.keys.lock().await.remove(id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File vault
// ---------------------------------------------------------------------------

/// File-backed vault: one file per identity under the vault root.
///
/// The default root is the platform data directory
/// (`~/.local/share/causette/keys` on Linux).
pub struct FileVault {
    root: PathBuf,
}

impl FileVault {
    pub fn new() -> Result<Self, VaultError> {
        let project_dirs =
            ProjectDirs::from("com", "causette", "causette").ok_or(VaultError::NoDataDir)?;
        Self::at(project_dirs.data_dir().join("keys"))
    }

    /// Open a vault rooted at an explicit directory. Useful for tests and
    /// custom layouts.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    // Identity ids are opaque strings; hex keeps the file name safe.
    fn key_path(&self, id: &IdentityId) -> PathBuf {
        self.root.join(format!("{}.key", hex::encode(id.as_str())))
    }
}

#[async_trait]
impl KeyVault for FileVault {
    async fn put(&self, id: &IdentityId, keypair: &IdentityKeyPair) -> Result<(), VaultError> {
        tokio::fs::write(self.key_path(id), encode_keypair(keypair)).await?;
        Ok(())
    }

    async fn get(&self, id: &IdentityId) -> Result<IdentityKeyPair, VaultError> {
        let path = self.key_path(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound)
            }
            Err(err) => return Err(err.into()),
        };

        match decode_keypair(&bytes) {
            Ok(keypair) => Ok(keypair),
            Err(err) => {
                warn!(identity = %id, path = %path.display(), "purging corrupt key file");
                let _ = tokio::fs::remove_file(&path).await;
                Err(err)
            }
        }
    }

    async fn delete(&self, id: &IdentityId) -> Result<(), VaultError> {
        match tokio::fs::remove_file(self.key_path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> IdentityId {
        IdentityId::from(s)
    }

    #[tokio::test]
    async fn test_memory_vault_roundtrip() {
        let vault = MemoryVault::new();
        let keypair = IdentityKeyPair::generate();

        vault.put(&id("alice"), &keypair).await.unwrap();
        let loaded = vault.get(&id("alice")).await.unwrap();
        assert_eq!(loaded.public_key_bytes(), keypair.public_key_bytes());
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let vault = MemoryVault::new();
        assert!(matches!(
            vault.get(&id("nobody")).await,
            Err(VaultError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_purged() {
        let vault = MemoryVault::new();
        let keypair = IdentityKeyPair::generate();
        vault.put(&id("alice"), &keypair).await.unwrap();
        vault.poison(&id("alice")).await;

        assert!(matches!(
            vault.get(&id("alice")).await,
            Err(VaultError::Corrupt)
        ));
        // The unusable entry is gone, not silently retained.
        assert!(matches!(
            vault.get(&id("alice")).await,
            Err(VaultError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_file_vault_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::at(dir.path()).unwrap();
        let keypair = IdentityKeyPair::generate();

        vault.put(&id("alice"), &keypair).await.unwrap();
        let loaded = vault.get(&id("alice")).await.unwrap();
        assert_eq!(loaded.public_key_bytes(), keypair.public_key_bytes());

        vault.delete(&id("alice")).await.unwrap();
        assert!(matches!(
            vault.get(&id("alice")).await,
            Err(VaultError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_file_vault_purges_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::at(dir.path()).unwrap();

        let path = vault.key_path(&id("alice"));
        tokio::fs::write(&path, b"garbage").await.unwrap();

        assert!(matches!(
            vault.get(&id("alice")).await,
            Err(VaultError::Corrupt)
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_identities_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let vault = FileVault::at(dir.path()).unwrap();
        let alice_key = IdentityKeyPair::generate();
        let bob_key = IdentityKeyPair::generate();

        vault.put(&id("alice"), &alice_key).await.unwrap();
        vault.put(&id("bob"), &bob_key).await.unwrap();

        assert_eq!(
            vault.get(&id("alice")).await.unwrap().public_key_bytes(),
            alice_key.public_key_bytes()
        );
        assert_eq!(
            vault.get(&id("bob")).await.unwrap().public_key_bytes(),
            bob_key.public_key_bytes()
        );
    }
}
