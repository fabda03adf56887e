//! Persistent credential storage
//!
//! Credentials are kept as a small key-value document:
//! - access token and refresh token, written together as a pair
//! - a per-installation device identifier, generated once and never rotated
//!
//! Every operation is infallible from the caller's point of view. A missing,
//! unreadable or corrupt backend reads as "no credentials" and failed writes
//! are logged, so losing persisted state degrades to "signed out" instead of
//! breaking request flows.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, DEVICE_ID_KEY, REFRESH_TOKEN_KEY};

/// Storage format version (for future migrations)
const STORAGE_VERSION: u32 = 1;

/// Point-in-time view of everything the store holds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub device_id: Option<String>,
}

/// Key-value access to the persisted credentials.
///
/// Implementations must never panic or surface backend errors.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn device_id(&self) -> Option<String>;

    /// Replaces the access token, and the refresh token when one is given,
    /// in a single write.
    fn set_tokens(&self, access_token: &str, refresh_token: Option<&str>);

    fn set_device_id(&self, device_id: &str);

    /// Drops both tokens. The device identifier survives.
    fn clear(&self);

    fn snapshot(&self) -> Credentials {
        Credentials {
            access_token: self.access_token(),
            refresh_token: self.refresh_token(),
            device_id: self.device_id(),
        }
    }
}

/// Returns the stored device identifier, generating and persisting a new
/// random one on first use.
pub fn ensure_device_id(store: &dyn CredentialStore) -> String {
    if let Some(id) = store.device_id() {
        return id;
    }

    let id = uuid::Uuid::new_v4().to_string();
    store.set_device_id(&id);
    info!("Generated new device identifier");
    id
}

/// On-disk document layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredentials {
    /// Version for schema migrations
    version: u32,

    /// Raw key-value entries
    entries: BTreeMap<String, String>,
}

impl Default for StoredCredentials {
    fn default() -> Self {
        Self {
            version: STORAGE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// Credential store backed by a JSON file
pub struct FileCredentialStore {
    /// Path to the credentials document
    path: PathBuf,

    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Creates a store at the given path. The file is created lazily on the
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Creates a store at the platform default location
    pub fn at_default_location() -> Result<Self> {
        let path = common::platform::get_credentials_path()
            .ok_or_else(|| anyhow!("Could not determine data directory for your platform"))?;
        Ok(Self::new(path))
    }

    /// Returns the path to the credentials file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoredCredentials> {
        if !self.path.exists() {
            return Ok(StoredCredentials::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let stored: StoredCredentials = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse credentials file: {}", e))?;

        if stored.version != STORAGE_VERSION {
            warn!(
                "Credentials file has version {}, expected {}",
                stored.version, STORAGE_VERSION
            );
        }
        Ok(stored)
    }

    /// Writes through a sibling temp file and renames it into place so the
    /// document is replaced as a whole.
    fn save(&self, stored: &StoredCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(stored)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Saved {} credential entries", stored.entries.len());
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.load() {
            Ok(stored) => stored.entries.get(key).cloned(),
            Err(e) => {
                warn!("Credential storage unavailable, reading {} as empty: {:#}", key, e);
                None
            }
        }
    }

    fn update(&self, what: &str, apply: impl FnOnce(&mut BTreeMap<String, String>)) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut stored = match self.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Discarding unreadable credentials file: {:#}", e);
                StoredCredentials::default()
            }
        };
        apply(&mut stored.entries);

        if let Err(e) = self.save(&stored) {
            warn!("Failed to persist credentials ({}): {:#}", what, e);
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_KEY)
    }

    fn refresh_token(&self) -> Option<String> {
        self.get(REFRESH_TOKEN_KEY)
    }

    fn device_id(&self) -> Option<String> {
        self.get(DEVICE_ID_KEY)
    }

    fn set_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        self.update("set tokens", |entries| {
            entries.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
            if let Some(refresh_token) = refresh_token {
                entries.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
            }
        });
    }

    fn set_device_id(&self, device_id: &str) {
        self.update("set device id", |entries| {
            entries.insert(DEVICE_ID_KEY.to_string(), device_id.to_string());
        });
    }

    fn clear(&self) {
        self.update("clear", |entries| {
            entries.remove(ACCESS_TOKEN_KEY);
            entries.remove(REFRESH_TOKEN_KEY);
        });
        info!("Cleared stored tokens");
    }
}

/// In-process credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with a token pair
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        let store = Self::new();
        store.set_tokens(access_token, Some(refresh_token));
        store
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Credentials) -> T) -> T {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> Option<String> {
        self.with_inner(|c| c.access_token.clone())
    }

    fn refresh_token(&self) -> Option<String> {
        self.with_inner(|c| c.refresh_token.clone())
    }

    fn device_id(&self) -> Option<String> {
        self.with_inner(|c| c.device_id.clone())
    }

    fn set_tokens(&self, access_token: &str, refresh_token: Option<&str>) {
        self.with_inner(|c| {
            c.access_token = Some(access_token.to_string());
            if let Some(refresh_token) = refresh_token {
                c.refresh_token = Some(refresh_token.to_string());
            }
        });
    }

    fn set_device_id(&self, device_id: &str) {
        self.with_inner(|c| c.device_id = Some(device_id.to_string()));
    }

    fn clear(&self) {
        self.with_inner(|c| {
            c.access_token = None;
            c.refresh_token = None;
        });
    }

    fn snapshot(&self) -> Credentials {
        self.with_inner(|c| c.clone())
    }
}
