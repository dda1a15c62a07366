use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroize;

use crate::cookie_jar::Cookie;
use crate::CredentialError;

const NONCE_LEN: usize = 12;

/// Encrypted on-disk copy of the cookie entries, so a session survives restarts
/// and can be observed by other processes sharing the directory.
pub struct DurableMirror {
    store_path: PathBuf,
    cipher: Aes256Gcm,
}

impl DurableMirror {
    pub fn new<P: AsRef<Path>>(store_path: P, master_key: &[u8; 32]) -> Result<Self, CredentialError> {
        let store_path = store_path.as_ref().to_path_buf();
        fs::create_dir_all(&store_path)?;

        let cipher = Aes256Gcm::new(master_key.into());

        Ok(Self { store_path, cipher })
    }

    pub fn path(&self) -> &Path {
        &self.store_path
    }

    pub fn store(&self, name: &str, cookie: &Cookie) -> Result<(), CredentialError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut plaintext = serde_json::to_vec(cookie)?;
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| CredentialError::Encryption);
        plaintext.zeroize();
        let ciphertext = ciphertext?;

        // Write to temp file, then rename so readers never see a torn entry
        let entry_path = self.entry_path(name);
        let temp_path = entry_path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&nonce_bytes)?;
            file.write_all(&ciphertext)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &entry_path)?;

        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Option<Cookie>, CredentialError> {
        let entry_path = self.entry_path(name);
        if !entry_path.exists() {
            return Ok(None);
        }

        let mut file = File::open(&entry_path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        if data.len() < NONCE_LEN {
            return Err(CredentialError::Encryption);
        }

        let nonce = Nonce::from_slice(&data[..NONCE_LEN]);
        let mut plaintext = self
            .cipher
            .decrypt(nonce, &data[NONCE_LEN..])
            .map_err(|_| CredentialError::Encryption)?;

        let cookie: Result<Cookie, serde_json::Error> = serde_json::from_slice(&plaintext);
        plaintext.zeroize();

        Ok(Some(cookie?))
    }

    pub fn delete(&self, name: &str) -> Result<(), CredentialError> {
        let entry_path = self.entry_path(name);
        if entry_path.exists() {
            fs::remove_file(&entry_path)?;
        }
        Ok(())
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(name.as_bytes());
        self.store_path.join(format!("{:x}.enc", hasher.finalize()))
    }
}

/// Read the 32-byte master key, creating it with random bytes on first use.
pub fn load_or_create_master_key<P: AsRef<Path>>(key_path: P) -> Result<[u8; 32], CredentialError> {
    let key_path = key_path.as_ref();

    if key_path.exists() {
        let mut key_bytes = fs::read(key_path)?;
        if key_bytes.len() != 32 {
            key_bytes.zeroize();
            return Err(CredentialError::InvalidKey);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&key_bytes);
        key_bytes.zeroize();
        return Ok(key);
    }

    if let Some(parent) = key_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);

    let mut file = OpenOptions::new().create_new(true).write(true).open(key_path)?;
    file.write_all(&key)?;
    file.sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(key_path, fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("Created credential master key at {:?}", key_path);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn test_key() -> [u8; 32] {
        [7u8; 32]
    }

    #[test]
    fn test_store_and_load() {
        let temp = TempDir::new().unwrap();
        let mirror = DurableMirror::new(temp.path(), &test_key()).unwrap();
        let cookie = Cookie::new("token-value", Utc::now() + Duration::days(1));

        mirror.store("access_token", &cookie).unwrap();
        assert_eq!(mirror.load("access_token").unwrap(), Some(cookie));
    }

    #[test]
    fn test_entries_are_encrypted_at_rest() {
        let temp = TempDir::new().unwrap();
        let mirror = DurableMirror::new(temp.path(), &test_key()).unwrap();
        mirror
            .store("access_token", &Cookie::new("plain-secret", Utc::now()))
            .unwrap();

        for entry in fs::read_dir(temp.path()).unwrap() {
            let bytes = fs::read(entry.unwrap().path()).unwrap();
            let text = String::from_utf8_lossy(&bytes);
            assert!(!text.contains("plain-secret"));
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let temp = TempDir::new().unwrap();
        let mirror = DurableMirror::new(temp.path(), &test_key()).unwrap();
        mirror.store("refresh_token", &Cookie::new("r", Utc::now())).unwrap();

        let other = DurableMirror::new(temp.path(), &[9u8; 32]).unwrap();
        assert!(matches!(other.load("refresh_token"), Err(CredentialError::Encryption)));
    }

    #[test]
    fn test_delete_and_missing() {
        let temp = TempDir::new().unwrap();
        let mirror = DurableMirror::new(temp.path(), &test_key()).unwrap();
        mirror.store("access_token", &Cookie::new("a", Utc::now())).unwrap();
        mirror.delete("access_token").unwrap();
        mirror.delete("access_token").unwrap();
        assert_eq!(mirror.load("access_token").unwrap(), None);
    }

    #[test]
    fn test_master_key_is_stable() {
        let temp = TempDir::new().unwrap();
        let key_path = temp.path().join("keys").join("master.key");
        let first = load_or_create_master_key(&key_path).unwrap();
        let second = load_or_create_master_key(&key_path).unwrap();
        assert_eq!(first, second);

        fs::write(&key_path, b"short").unwrap();
        assert!(matches!(
            load_or_create_master_key(&key_path),
            Err(CredentialError::InvalidKey)
        ));
    }
}
