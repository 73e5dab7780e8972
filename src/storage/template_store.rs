use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{is_root, lookup_user, validate_username, FaceUnlockError, Result};
use crate::core::types::{Encoding, Template};

const STORAGE_VERSION: u32 = 1;

/// On-disk form of one user's enrollment.
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub version: u32,
    pub username: String,
    pub encodings: Vec<Encoding>,
    pub created_at: DateTime<Utc>,
}

/// Read path shared by the guardian and the authentication boundary.
pub trait TemplateSource {
    /// Never fails: anything unreadable is treated as "not enrolled".
    fn load_or_empty(&self, username: &str) -> Template;
}

pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, username: &str) -> Result<PathBuf> {
        validate_username(username)?;
        Ok(self.dir.join(format!("{}.bin", username)))
    }

    pub fn exists(&self, username: &str) -> bool {
        self.path_for(username).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Create or wholesale replace the user's record.
    pub fn save(&self, username: &str, template: &Template) -> Result<()> {
        if template.is_empty() {
            return Err(FaceUnlockError::Storage("Refusing to save an empty template".into()));
        }
        let path = self.path_for(username)?;
        fs::create_dir_all(&self.dir)?;

        let record = TemplateRecord {
            version: STORAGE_VERSION,
            username: username.to_string(),
            encodings: template.encodings.clone(),
            created_at: Utc::now(),
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| FaceUnlockError::Storage(format!("Failed to serialize: {}", e)))?;

        let tmp = self.dir.join(format!(".{}.bin.tmp", username));
        let written = (|| -> Result<()> {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
            // Mode on create is masked by umask; pin it explicitly.
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        self.hand_to_owner(&tmp, username);
        fs::rename(&tmp, &path)?;

        tracing::info!(
            "Saved {} encodings for {} to {}",
            template.len(),
            username,
            path.display()
        );
        Ok(())
    }

    /// The guardian runs as the user and must still read the file.
    fn hand_to_owner(&self, path: &Path, username: &str) {
        if !is_root() {
            return;
        }
        match lookup_user(username) {
            Some(ids) => {
                if let Err(e) = std::os::unix::fs::chown(path, Some(ids.uid), Some(ids.gid)) {
                    tracing::warn!("Could not hand {} to {}: {}", path.display(), username, e);
                }
            }
            None => tracing::warn!("No system account {}, leaving template owned by root", username),
        }
    }

    pub fn load(&self, username: &str) -> Result<Template> {
        let path = self.path_for(username)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FaceUnlockError::NoTemplate(username.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let record: TemplateRecord = bincode::deserialize(&data)
            .map_err(|e| FaceUnlockError::Storage(format!("Failed to deserialize: {}", e)))?;

        if record.version > STORAGE_VERSION {
            return Err(FaceUnlockError::Storage(format!(
                "Template for {} has unsupported version {}",
                username, record.version
            )));
        }
        if record.username != username {
            return Err(FaceUnlockError::Storage(format!(
                "Template file for {} belongs to {}",
                username, record.username
            )));
        }

        tracing::debug!(
            "Loaded {} encodings for {} (enrolled {})",
            record.encodings.len(),
            username,
            record.created_at
        );
        Ok(Template::new(record.encodings))
    }

    /// Returns whether a record was removed.
    pub fn delete(&self, username: &str) -> Result<bool> {
        let path = self.path_for(username)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed template for {}", username);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl TemplateSource for TemplateStore {
    fn load_or_empty(&self, username: &str) -> Template {
        match self.load(username) {
            Ok(template) => template,
            Err(FaceUnlockError::NoTemplate(_)) => {
                tracing::debug!("No template enrolled for {}", username);
                Template::default()
            }
            Err(e) => {
                tracing::warn!("Template for {} unreadable, treating as not enrolled: {}", username, e);
                Template::default()
            }
        }
    }
}

/// Fixed in-memory template, for tests and one-off runs.
impl TemplateSource for Template {
    fn load_or_empty(&self, _username: &str) -> Template {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample() -> Template {
        Template::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]])
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());

        store.save("alice", &sample()).unwrap();
        assert!(store.exists("alice"));
        assert_eq!(store.load("alice").unwrap(), sample());
    }

    #[test]
    fn test_file_is_private() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        store.save("alice", &sample()).unwrap();

        let mode = fs::metadata(dir.path().join("alice.bin")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!dir.path().join(".alice.bin.tmp").exists());
    }

    #[test]
    fn test_save_replaces_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        store.save("alice", &sample()).unwrap();

        let replacement = Template::new(vec![vec![0.9, 0.9, 0.9]]);
        store.save("alice", &replacement).unwrap();
        assert_eq!(store.load("alice").unwrap(), replacement);
    }

    #[test]
    fn test_missing_and_corrupt_records() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());

        assert!(matches!(store.load("bob"), Err(FaceUnlockError::NoTemplate(_))));
        assert!(store.load_or_empty("bob").is_empty());

        fs::write(dir.path().join("bob.bin"), b"not a template").unwrap();
        assert!(matches!(store.load("bob"), Err(FaceUnlockError::Storage(_))));
        assert!(store.load_or_empty("bob").is_empty());
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        store.save("alice", &sample()).unwrap();

        assert!(store.delete("alice").unwrap());
        assert!(!store.delete("alice").unwrap());
        assert!(!store.exists("alice"));
    }

    #[test]
    fn test_rejects_path_tricks() {
        let dir = TempDir::new().unwrap();
        let store = TemplateStore::new(dir.path().to_path_buf());
        assert!(store.save("../escape", &sample()).is_err());
        assert!(store.load_or_empty("../escape").is_empty());
        assert!(store.save("alice", &Template::default()).is_err());
    }
}
