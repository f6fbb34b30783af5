//! Session manager: sign-in, sign-out and restore-on-restart.
//!
//! The signed-in identity is persisted through a [`SessionStorage`]. Storage
//! failures are logged and never fail the session operation itself.

use domain::models::Identity;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Session storage errors.
#[derive(Debug, Error)]
pub enum SessionStorageError {
    #[error("Session storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Where the signed-in identity survives restarts.
#[async_trait::async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self) -> Result<Option<Identity>, SessionStorageError>;

    async fn save(&self, identity: &Identity) -> Result<(), SessionStorageError>;

    async fn clear(&self) -> Result<(), SessionStorageError>;
}

/// Identity stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SessionStorage for FileSessionStorage {
    async fn load(&self) -> Result<Option<Identity>, SessionStorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, identity: &Identity) -> Result<(), SessionStorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(identity)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionStorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Identity held in memory; for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    slot: Mutex<Option<Identity>>,
    broken: Mutex<bool>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds `identity`.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            slot: Mutex::new(Some(identity)),
            broken: Mutex::new(false),
        }
    }

    /// Make every operation fail with an I/O error.
    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap_or_else(PoisonError::into_inner) = broken;
    }

    pub fn stored(&self) -> Option<Identity> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check(&self) -> Result<(), SessionStorageError> {
        if *self.broken.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "storage broken").into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn load(&self) -> Result<Option<Identity>, SessionStorageError> {
        self.check()?;
        Ok(self.stored())
    }

    async fn save(&self, identity: &Identity) -> Result<(), SessionStorageError> {
        self.check()?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SessionStorageError> {
        self.check()?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Observable session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    /// True while a stored session is being restored.
    pub loading: bool,
}

/// Owns the signed-in identity.
pub struct SessionManager {
    storage: Arc<dyn SessionStorage>,
    state: watch::Sender<SessionState>,
}

impl SessionManager {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { storage, state }
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Restore the identity persisted by a previous run, if any.
    pub async fn restore(&self) -> Option<Identity> {
        self.state.send_modify(|s| s.loading = true);

        let restored = match self.storage.load().await {
            Ok(identity) => identity,
            Err(e) => {
                error!(error = %e, "Failed to restore session");
                None
            }
        };

        self.state.send_modify(|s| {
            if s.identity.is_none() {
                s.identity = restored.clone();
            }
            s.loading = false;
        });

        match &restored {
            Some(identity) => info!(user_id = %identity.id, "Session restored"),
            None => debug!("No stored session"),
        }
        self.current_identity()
    }

    /// Sign in with an optional display name.
    ///
    /// Signing in while already signed in returns the current identity.
    pub async fn sign_in(&self, display_name: Option<String>) -> Identity {
        if let Some(identity) = self.current_identity() {
            debug!(user_id = %identity.id, "Already signed in");
            return identity;
        }

        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        let identity = Identity::generate(display_name);

        if let Err(e) = self.storage.save(&identity).await {
            error!(user_id = %identity.id, error = %e, "Failed to persist session");
        }

        self.state.send_modify(|s| {
            s.identity = Some(identity.clone());
            s.loading = false;
        });
        info!(user_id = %identity.id, "Signed in");
        identity
    }

    /// Sign out. Returns the identity that was signed in, if any.
    pub async fn sign_out(&self) -> Option<Identity> {
        let mut previous = None;
        self.state.send_modify(|s| {
            previous = s.identity.take();
            s.loading = false;
        });

        if let Err(e) = self.storage.clear().await {
            error!(error = %e, "Failed to clear stored session");
        }

        if let Some(identity) = &previous {
            info!(user_id = %identity.id, "Signed out");
        }
        previous
    }
}
