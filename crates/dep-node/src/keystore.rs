//! Keystore for identity persistence (§4.2, §6.3): the node's Ed25519
//! keypair survives restarts by being written, once, to a single file
//! under the data directory.

use std::path::{Path, PathBuf};

use dep_crypto::Identity;
use tracing::{debug, info};

use crate::error::{NodeError, NodeResult};

pub struct Keystore {
    path: PathBuf,
}

impl Keystore {
    pub fn new(data_dir: &Path, key_path: &Path) -> Self {
        let path = if key_path.is_absolute() {
            key_path.to_path_buf()
        } else {
            data_dir.join(key_path)
        };
        Self { path }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the existing identity, or generate and persist a new one.
    pub fn load_or_generate(&self) -> NodeResult<Identity> {
        if self.exists() {
            self.load()
        } else {
            info!("no existing identity found, generating new key");
            let identity = Identity::generate();
            self.save(&identity)?;
            Ok(identity)
        }
    }

    pub fn load(&self) -> NodeResult<Identity> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| NodeError::Keystore(format!("failed to read identity key file: {e}")))?;
        let identity = Identity::load_from_bytes(&bytes)
            .map_err(|e| NodeError::Keystore(format!("invalid identity key file: {e}")))?;
        debug!(node_id = %identity.node_id(), path = %self.path.display(), "loaded identity from keystore");
        Ok(identity)
    }

    pub fn save(&self, identity: &Identity) -> NodeResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NodeError::Keystore(format!("failed to create keystore dir: {e}")))?;
        }
        std::fs::write(&self.path, identity.to_bytes())
            .map_err(|e| NodeError::Keystore(format!("failed to write identity key file: {e}")))?;
        Self::set_restrictive_permissions(&self.path)?;
        info!(node_id = %identity.node_id(), path = %self.path.display(), "saved identity to keystore");
        Ok(())
    }

    pub fn delete(&self) -> NodeResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .map_err(|e| NodeError::Keystore(format!("failed to delete identity key file: {e}")))?;
        }
        Ok(())
    }

    fn set_restrictive_permissions(path: &Path) -> NodeResult<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)
                .map_err(|e| NodeError::Keystore(format!("failed to set key permissions: {e}")))?;
        }
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keystore(dir: &TempDir) -> Keystore {
        Keystore::new(dir.path(), Path::new("identity.key"))
    }

    #[test]
    fn generate_and_load_returns_the_same_identity() {
        let dir = TempDir::new().unwrap();
        let ks = keystore(&dir);
        assert!(!ks.exists());

        let id1 = ks.load_or_generate().unwrap();
        assert!(ks.exists());

        let id2 = ks.load_or_generate().unwrap();
        assert_eq!(id1.node_id(), id2.node_id());

        let id3 = ks.load().unwrap();
        assert_eq!(id1.node_id(), id3.node_id());
    }

    #[test]
    fn save_and_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let ks = keystore(&dir);
        let identity = Identity::generate();
        ks.save(&identity).unwrap();

        let loaded = ks.load().unwrap();
        assert_eq!(identity.node_id(), loaded.node_id());
    }

    #[test]
    fn invalid_key_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let ks = keystore(&dir);
        std::fs::write(dir.path().join("identity.key"), b"too short").unwrap();
        assert!(ks.load().is_err());
    }

    #[test]
    fn delete_removes_the_key_file() {
        let dir = TempDir::new().unwrap();
        let ks = keystore(&dir);
        ks.load_or_generate().unwrap();
        assert!(ks.exists());
        ks.delete().unwrap();
        assert!(!ks.exists());
    }

    #[test]
    fn absolute_key_path_is_not_joined_to_data_dir() {
        let dir = TempDir::new().unwrap();
        let absolute = dir.path().join("elsewhere.key");
        let ks = Keystore::new(Path::new("/should/not/be/used"), &absolute);
        ks.load_or_generate().unwrap();
        assert!(absolute.exists());
    }
}
