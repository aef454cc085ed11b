//! Credential storage.
//!
//! A [`CredentialStore`] is the single owner of the current [`CredentialPair`]. It does
//! plain data access only; renewing credentials is the job of the
//! [`RefreshCoordinator`](crate::RefreshCoordinator).

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use crate::CredentialPair;

/// Holds the current access/refresh credential pair.
///
/// Reads of an absent pair yield an empty pair, never an error. Implementations are
/// shared between the request pipeline and the refresh coordinator without any
/// locking discipline beyond their own interior mutability.
pub trait CredentialStore: Send + Sync {
    /// The current pair.
    fn get(&self) -> CredentialPair;

    /// Replace the current pair wholesale.
    fn set(&self, pair: CredentialPair);

    /// Remove both credentials.
    fn clear(&self);
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn get(&self) -> CredentialPair {
        (**self).get()
    }

    fn set(&self, pair: CredentialPair) {
        (**self).set(pair)
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/////////////////////////////////////////// AuthSignal ///////////////////////////////////////////

/// Best-effort notification of authentication state changes.
#[derive(Debug)]
struct AuthSignal {
    tx: watch::Sender<bool>,
}

impl AuthSignal {
    fn new(authenticated: bool) -> Self {
        let (tx, _) = watch::channel(authenticated);
        Self { tx }
    }

    fn publish(&self, pair: &CredentialPair) {
        let authenticated = pair.access.is_some();
        self.tx.send_if_modified(|state| {
            let changed = *state != authenticated;
            *state = authenticated;
            changed
        });
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

///////////////////////////////////// MemoryCredentialStore /////////////////////////////////////

/// A credential store that lives for the lifetime of the process.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    pair: Mutex<CredentialPair>,
    signal: AuthSignal,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_pair(CredentialPair::empty())
    }

    /// Creates a store seeded with `pair`.
    pub fn with_pair(pair: CredentialPair) -> Self {
        let signal = AuthSignal::new(pair.access.is_some());
        Self {
            pair: Mutex::new(pair),
            signal,
        }
    }

    /// Subscribe to authentication state changes.
    ///
    /// The receiver observes `true` while an access credential is stored.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> CredentialPair {
        self.pair
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, pair: CredentialPair) {
        let mut guard = self.pair.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = pair;
        self.signal.publish(&guard);
    }

    fn clear(&self) {
        self.set(CredentialPair::empty());
    }
}

////////////////////////////////////// FileCredentialStore //////////////////////////////////////

/// A credential store persisted as a JSON file so a session survives restarts.
///
/// Every `get` reads through to disk, so separate processes sharing the file see each
/// other's updates. There is no cross-process locking; the last writer wins. I/O
/// failures are logged and otherwise treated as an absent pair.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    signal: AuthSignal,
}

impl FileCredentialStore {
    /// Opens (without creating) the store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = read_pair(&path);
        Self {
            path,
            signal: AuthSignal::new(current.access.is_some()),
        }
    }

    /// The file backing this store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Subscribe to authentication state changes made through this instance.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }

    fn write(&self, pair: &CredentialPair) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_vec_pretty(pair)?;
        let tmp = self.path.with_extension("tmp");
        let mut file = open_private(&tmp)?;
        file.write_all(&serialized)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> CredentialPair {
        read_pair(&self.path)
    }

    fn set(&self, pair: CredentialPair) {
        if let Err(err) = self.write(&pair) {
            tracing::warn!(path = %self.path.display(), %err, "failed to persist credentials");
        }
        self.signal.publish(&pair);
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "failed to remove credentials");
            }
        }
        self.signal.publish(&CredentialPair::empty());
    }
}

fn read_pair(path: &Path) -> CredentialPair {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return CredentialPair::empty(),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "failed to read credentials");
            return CredentialPair::empty();
        }
    };
    serde_json::from_slice(&contents).unwrap_or_else(|err| {
        tracing::warn!(path = %path.display(), %err, "ignoring unreadable credentials file");
        CredentialPair::empty()
    })
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
