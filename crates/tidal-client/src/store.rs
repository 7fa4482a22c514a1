use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tidal_core::session_keys::{ACCESS_TOKEN, REFRESH_TOKEN};
use tracing::{debug, warn};

use crate::config::{ClientConfig, TokenStoreKind};
use crate::error::StoreError;

/// Domain-scoped key-value storage for session credentials.
pub trait TokenStore: Send + Sync {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, name: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

fn scoped_key(domain: &str, name: &str) -> String {
    format!("{domain}::{name}")
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    domain: String,
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("failed to lock memory store".to_string()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries()?.get(&scoped_key(&self.domain, name)).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.entries()?
            .insert(scoped_key(&self.domain, name), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.entries()?.remove(&scoped_key(&self.domain, name));
        Ok(())
    }
}

/// Credentials kept in the platform keychain under the `tidal` service.
pub struct KeyringTokenStore {
    service: String,
    domain: String,
}

impl KeyringTokenStore {
    pub fn new(domain: &str) -> Self {
        Self {
            service: "tidal".to_string(),
            domain: domain.to_string(),
        }
    }

    fn entry(&self, name: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, &scoped_key(&self.domain, name))
            .map_err(|err| StoreError::Unavailable(format!("failed to access keyring: {err}")))
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        match self.entry(name)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(StoreError::Unavailable(format!(
                "failed to load {name} for domain '{}': {err}",
                self.domain
            ))),
        }
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.entry(name)?
            .set_password(value)
            .map_err(|err| StoreError::Unavailable(format!("failed to store {name}: {err}")))?;
        debug!(domain = %self.domain, name, "stored credential in keyring");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        match self.entry(name)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => {
                warn!(domain = %self.domain, name, "failed to delete credential: {err}");
                Ok(())
            }
        }
    }
}

/// JSON file holding credentials for every domain, for hosts without a
/// keychain.
pub struct FileTokenStore {
    path: PathBuf,
    domain: String,
    lock: Mutex<()>,
}

type FileEntries = HashMap<String, HashMap<String, String>>;

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>, domain: &str) -> Self {
        Self {
            path: path.into(),
            domain: domain.to_string(),
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Result<FileEntries, StoreError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", self.path.display())))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|err| StoreError::Corrupted(format!("{}: {err}", self.path.display())))
    }

    fn write(&self, entries: &FileEntries) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| StoreError::Unavailable(format!("{}: {err}", parent.display())))?;
        }
        let contents = serde_json::to_string_pretty(entries)
            .map_err(|err| StoreError::Corrupted(err.to_string()))?;
        fs::write(&self.path, contents)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", self.path.display())))
    }

    fn update<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("failed to lock token file".to_string()))?;
        let mut entries = self.read()?;
        apply(entries.entry(self.domain.clone()).or_default());
        entries.retain(|_, values| !values.is_empty());
        self.write(&entries)
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("failed to lock token file".to_string()))?;
        Ok(self
            .read()?
            .get(&self.domain)
            .and_then(|values| values.get(name))
            .cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(name.to_string(), value.to_string());
        })
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.remove(name);
        })
    }
}

/// Backend selected by `config.token_store`; `file_path` is only used by the
/// file backend.
pub fn store_for(config: &ClientConfig, file_path: &Path) -> Arc<dyn TokenStore> {
    let domain = config.token_domain.as_str();
    match config.token_store {
        TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new(domain)),
        TokenStoreKind::File => Arc::new(FileTokenStore::new(file_path, domain)),
        TokenStoreKind::Keyring => Arc::new(KeyringTokenStore::new(domain)),
    }
}

/// Typed view over a [`TokenStore`] for the session's own entries.
#[derive(Clone)]
pub struct SessionTokens {
    store: Arc<dyn TokenStore>,
    extra_keys: Vec<String>,
}

impl SessionTokens {
    pub fn new(store: Arc<dyn TokenStore>, extra_keys: Vec<String>) -> Self {
        Self { store, extra_keys }
    }

    pub fn access_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(ACCESS_TOKEN)?
            .filter(|value| !value.trim().is_empty()))
    }

    pub fn refresh_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .store
            .get(REFRESH_TOKEN)?
            .filter(|value| !value.trim().is_empty()))
    }

    pub fn store_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(ACCESS_TOKEN, token)
    }

    pub fn store_refresh_token(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(REFRESH_TOKEN, token)
    }

    /// Removes every session entry; failures are logged and the remaining
    /// entries are still attempted.
    pub fn clear(&self) {
        let keys = [ACCESS_TOKEN, REFRESH_TOKEN]
            .into_iter()
            .chain(self.extra_keys.iter().map(String::as_str));
        for key in keys {
            if let Err(err) = self.store.remove(key) {
                warn!(event = "session_clear_failed", key, error = %err);
            }
        }
        debug!(event = "session_cleared");
    }
}
