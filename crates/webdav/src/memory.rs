//! In-process remote store, used by tests and for exercising the engine
//! without a server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use nav_backup_core::Credentials;

use crate::transport::{Connector, RemoteEntry, RemoteTransport, TransportError};

#[derive(Debug, Clone)]
struct StoredFile {
    content: Vec<u8>,
    last_modified: String,
}

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, StoredFile>,
    dirs: BTreeSet<String>,
    /// Credentials the remote accepts; `None` accepts anything.
    accepted: Option<(String, String)>,
    refuse_connect: bool,
    fail_mkdir: bool,
    malformed_listing: bool,
    failing_writes: Vec<String>,
    failing_lists: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
}

/// Shared remote state. Cloning hands out another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<State>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn require_credentials(&self, username: &str, password: &str) {
        self.lock().accepted = Some((username.to_owned(), password.to_owned()));
    }

    pub fn refuse_connections(&self) {
        self.lock().refuse_connect = true;
    }

    pub fn fail_mkdir(&self) {
        self.lock().fail_mkdir = true;
    }

    /// Every write whose path starts with `prefix` fails.
    pub fn fail_writes_under(&self, prefix: &str) {
        self.lock().failing_writes.push(prefix.to_owned());
    }

    pub fn fail_listing(&self, dir: &str) {
        self.lock().failing_lists.insert(normalize(dir));
    }

    pub fn fail_delete(&self, path: &str) {
        self.lock().failing_deletes.insert(path.to_owned());
    }

    /// Existence checks report a malformed multistatus body.
    pub fn answer_malformed(&self) {
        self.lock().malformed_listing = true;
    }

    /// Seeds a file, creating its parent directory.
    pub fn put_file(&self, path: &str, content: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.dirs.insert(parent(path));
        state.files.insert(
            path.to_owned(),
            StoredFile {
                content: content.into(),
                last_modified: "Mon, 01 Jan 2024 00:00:00 GMT".to_owned(),
            },
        );
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(path).map(|f| f.content.clone())
    }

    pub fn has_dir(&self, dir: &str) -> bool {
        let dir = normalize(dir);
        dir == "/" || self.lock().dirs.contains(&dir)
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }
}

fn normalize(dir: &str) -> String {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => normalize(dir),
        None => "/".to_owned(),
    }
}

fn status(method: &str, path: &str, status: u16) -> TransportError {
    TransportError::Status {
        method: method.to_owned(),
        path: path.to_owned(),
        status,
    }
}

/// One session against a [`MemoryRemote`].
struct MemorySession {
    remote: MemoryRemote,
    credentials: Credentials,
}

impl MemorySession {
    fn authorize(&self, method: &str, path: &str) -> Result<MutexGuard<'_, State>, TransportError> {
        let state = self.remote.lock();
        if let Some((user, pass)) = &state.accepted {
            if *user != self.credentials.username || *pass != self.credentials.password {
                return Err(status(method, path, 401));
            }
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl RemoteTransport for MemorySession {
    async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        let state = self.authorize("PROPFIND", path)?;
        if state.malformed_listing {
            return Err(TransportError::Malformed(
                "response has no multistatus element".to_owned(),
            ));
        }
        let dir = normalize(path);
        Ok(dir == "/" || state.dirs.contains(&dir) || state.files.contains_key(path))
    }

    async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        let mut state = self.authorize("MKCOL", path)?;
        if state.fail_mkdir {
            return Err(status("MKCOL", path, 403));
        }
        state.dirs.insert(normalize(path));
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        let state = self.authorize("PROPFIND", path)?;
        let dir = normalize(path);
        if state.failing_lists.contains(&dir) {
            return Err(status("PROPFIND", path, 500));
        }
        if dir != "/" && !state.dirs.contains(&dir) {
            return Err(status("PROPFIND", path, 404));
        }

        let subdirs = state
            .dirs
            .iter()
            .filter(|d| d.as_str() != "/" && parent(d) == dir)
            .map(|d| RemoteEntry {
                basename: d.rsplit('/').next().unwrap_or_default().to_owned(),
                size: 0,
                last_modified: String::new(),
                is_dir: true,
            });
        let files = state
            .files
            .iter()
            .filter(|(p, _)| parent(p) == dir)
            .map(|(p, f)| RemoteEntry {
                basename: p.rsplit('/').next().unwrap_or_default().to_owned(),
                size: f.content.len() as u64,
                last_modified: f.last_modified.clone(),
                is_dir: false,
            });
        Ok(subdirs.chain(files).collect())
    }

    async fn write(
        &self,
        path: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.authorize("PUT", path)?;
        if state.failing_writes.iter().any(|p| path.starts_with(p.as_str())) {
            return Err(status("PUT", path, 507));
        }
        let dir = parent(path);
        if dir != "/" && !state.dirs.contains(&dir) {
            return Err(status("PUT", path, 409));
        }
        if !overwrite && state.files.contains_key(path) {
            return Err(status("PUT", path, 412));
        }
        state.files.insert(
            path.to_owned(),
            StoredFile {
                content,
                last_modified: chrono::Utc::now().to_rfc2822(),
            },
        );
        Ok(())
    }

    async fn read_text(&self, path: &str) -> Result<String, TransportError> {
        let state = self.authorize("GET", path)?;
        let file = state
            .files
            .get(path)
            .ok_or_else(|| status("GET", path, 404))?;
        String::from_utf8(file.content.clone()).map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        let mut state = self.authorize("DELETE", path)?;
        if state.failing_deletes.contains(path) {
            return Err(status("DELETE", path, 423));
        }
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| status("DELETE", path, 404))
    }
}

impl Connector for MemoryRemote {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteTransport>, TransportError> {
        if self.lock().refuse_connect {
            return Err(TransportError::Request("connection refused".to_owned()));
        }
        Ok(Box::new(MemorySession {
            remote: self.clone(),
            credentials: credentials.clone(),
        }))
    }
}
