//! Session persistence.
//!
//! A [`Session`] is the token pair of a logged-in user. Tokens are held as
//! [`SecretString`] so they never appear in `Debug` output or logs.

use crate::error::ClientError;
use common::api::{TokenPair, UserInfo};
use common::secret::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct Session {
    pub access: SecretString,
    /// Absent when the server issued no refresh token; such a session cannot
    /// be renewed.
    pub refresh: Option<SecretString>,
    pub user: Option<UserInfo>,
}

impl Session {
    #[must_use]
    pub fn new(access: &str, refresh: Option<&str>) -> Self {
        Self {
            access: SecretString::from(access.to_string()),
            refresh: refresh.map(|r| SecretString::from(r.to_string())),
            user: None,
        }
    }

    #[must_use]
    pub fn from_token_pair(pair: &TokenPair) -> Self {
        Self {
            access: SecretString::from(pair.access.clone()),
            refresh: Some(SecretString::from(pair.refresh.clone())),
            user: Some(pair.user.clone()),
        }
    }
}

/// Where the client keeps its session between calls.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Option<Session>, ClientError>;

    fn save(&self, session: &Session) -> Result<(), ClientError>;

    /// Remove the session. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), ClientError>;
}

/// In-process store, lost on exit.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        // A panic while holding the lock cannot leave a half-written session
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        Ok(self.slot().clone())
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        *self.slot() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        *self.slot() = None;
        Ok(())
    }
}

/// On-disk layout of a session file.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<UserInfo>,
}

/// JSON file store. Writes go to a uniquely named temporary sibling that is
/// renamed into place, so a crash never leaves a truncated session behind and
/// two processes saving at once never share a temp file. On unix the file is
/// created with mode `0600`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<name>.<uuid>.tmp` next to the session file.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        self.path.with_file_name(name)
    }
}

fn store_error(action: &str, path: &Path, err: &io::Error) -> ClientError {
    ClientError::SessionStore(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[cfg(unix)]
fn create_private_file(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_private_file(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Session>, ClientError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(store_error("read", &self.path, &e)),
        };

        let stored: StoredSession = serde_json::from_slice(&raw).map_err(|e| {
            ClientError::SessionStore(format!(
                "Corrupt session file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(Some(Session {
            access: SecretString::from(stored.access),
            refresh: stored.refresh.map(SecretString::from),
            user: stored.user,
        }))
    }

    fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| store_error("create", parent, &e))?;
        }

        let stored = StoredSession {
            access: session.access.expose_secret().to_string(),
            refresh: session
                .refresh
                .as_ref()
                .map(|r| r.expose_secret().to_string()),
            user: session.user.clone(),
        };
        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| ClientError::SessionStore(format!("Failed to encode session: {}", e)))?;

        let temp = self.temp_path();
        let mut file = create_private_file(&temp).map_err(|e| store_error("create", &temp, &e))?;
        let written = file.write_all(&json).and_then(|()| file.sync_all());
        drop(file);

        if let Err(e) = written.and_then(|()| fs::rename(&temp, &self.path)) {
            let _ = fs::remove_file(&temp);
            return Err(store_error("write", &self.path, &e));
        }
        tracing::debug!(target: "medtag.client.session", path = %self.path.display(), "Session saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), ClientError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error("remove", &self.path, &e)),
        }
    }
}

/// `$HOME/.medtag/session.json`.
pub fn default_session_path() -> Result<PathBuf, ClientError> {
    std::env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(|home| PathBuf::from(home).join(".medtag").join("session.json"))
        .ok_or_else(|| {
            ClientError::Configuration(
                "HOME is not set; pass --session-file or set MEDTAG_SESSION_FILE".to_string(),
            )
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    /// The directory is removed when the returned guard drops.
    fn temp_store() -> (tempfile::TempDir, FileSessionStore) {
        let dir = tempfile::Builder::new()
            .prefix("medtag-session-")
            .tempdir()
            .unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));
        (dir, store)
    }

    fn leftover_temp_files(store: &FileSessionStore) -> Vec<PathBuf> {
        fs::read_dir(store.path().parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "tmp"))
            .collect()
    }

    #[test]
    fn test_memory_store_roundtrip_and_clear() {
        let store = MemorySessionStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&Session::new("access-1", Some("refresh-1"))).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access.expose_secret(), "access-1");

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let (_dir, store) = temp_store();
        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_persists_session() {
        let (_dir, store) = temp_store();
        store.save(&Session::new("access-1", Some("refresh-1"))).unwrap();

        // A fresh store on the same path sees the session
        let reopened = FileSessionStore::new(store.path().to_path_buf());
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded.access.expose_secret(), "access-1");
        assert_eq!(
            loaded.refresh.as_ref().map(|r| r.expose_secret().to_string()),
            Some("refresh-1".to_string())
        );
        assert!(leftover_temp_files(&store).is_empty());

        reopened.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_temp_paths_are_unique() {
        let (_dir, store) = temp_store();
        let first = store.temp_path();
        assert_ne!(first, store.temp_path());
        assert_eq!(first.parent(), store.path().parent());
        assert!(first
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("session.json."));
    }

    #[test]
    fn test_file_store_concurrent_saves_do_not_collide() {
        let (_dir, store) = temp_store();
        store.save(&Session::new("access-0", None)).unwrap();

        let handles: Vec<_> = (1..=8)
            .map(|i| {
                let store = FileSessionStore::new(store.path().to_path_buf());
                std::thread::spawn(move || {
                    store.save(&Session::new(&format!("access-{i}"), None))
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // Last rename wins; the file is always a complete session
        let loaded = store.load().unwrap().unwrap();
        assert!(loaded.access.expose_secret().starts_with("access-"));
        assert!(leftover_temp_files(&store).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = temp_store();
        store.save(&Session::new("access-1", None)).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let (_dir, store) = temp_store();
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{not json").unwrap();

        assert!(matches!(store.load(), Err(ClientError::SessionStore(_))));
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session = Session::new("access-secret-value", Some("refresh-secret-value"));
        let debug = format!("{:?}", session);
        assert!(!debug.contains("access-secret-value"));
        assert!(!debug.contains("refresh-secret-value"));
    }
}
