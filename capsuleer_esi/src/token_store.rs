use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    fs::{self, File, OpenOptions, TryLockError},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use capsuleer_core::{ids::CharacterId, time::Timestamp};
use serde::{Deserialize, Serialize};

use crate::{EsiError, EsiResult, auth::Credential};

pub trait TokenStore: Send + Sync {
    fn load(&self, character_name: &str) -> EsiResult<Option<Credential>>;
    fn save(&self, credential: &Credential) -> EsiResult<()>;
    fn remove(&self, character_name: &str) -> EsiResult<()>;
    fn character_names(&self) -> EsiResult<BTreeSet<String>>;

    /// Non-blocking attempt at the per-character refresh lock. `None` means
    /// another holder (usually another process) has it.
    fn try_lock_character(&self, character_name: &str) -> EsiResult<Option<RefreshLock>>;
}

/// Held for the duration of a read, refresh and write cycle. Dropping it releases the lock.
pub struct RefreshLock {
    held: HeldLock,
}

enum HeldLock {
    File(File),
    Memory {
        character_name: String,
        held: Arc<Mutex<HashSet<String>>>,
    },
}

impl Drop for RefreshLock {
    fn drop(&mut self) {
        match &self.held {
            HeldLock::File(file) => {
                if let Err(err) = file.unlock() {
                    log::warn!("failed to release refresh lock: {err}");
                }
            }
            HeldLock::Memory {
                character_name,
                held,
            } => {
                let mut held = match held.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                held.remove(character_name);
            }
        }
    }
}

/// On-disk shape: `{character_name: {character_id, access_token, ...}}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredCredential {
    character_id: CharacterId,
    access_token: String,
    refresh_token: String,
    access_token_expiry: Timestamp,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default)]
    updated_at: Option<Timestamp>,
}

impl StoredCredential {
    fn from_credential(credential: &Credential) -> Self {
        Self {
            character_id: credential.character_id,
            access_token: credential.access_token.clone(),
            refresh_token: credential.refresh_token.clone(),
            access_token_expiry: credential.access_token_expiry,
            scopes: credential.scopes.clone(),
            updated_at: Some(credential.updated_at),
        }
    }

    fn into_credential(self, character_name: String) -> Credential {
        Credential {
            character_name,
            character_id: self.character_id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            access_token_expiry: self.access_token_expiry,
            scopes: self.scopes,
            updated_at: self.updated_at.unwrap_or(self.access_token_expiry),
        }
    }
}

type CredentialFile = BTreeMap<String, StoredCredential>;

/// JSON credential file readable only by the owning user.
#[derive(Clone, Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> EsiResult<PathBuf> {
        let base = dirs::config_dir().ok_or(EsiError::InvalidConfig(
            "no user config directory; set CAPSULEER_TOKEN_FILE",
        ))?;
        Ok(base.join("capsuleer").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sidecar_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "credentials.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn character_lock_path(&self, character_name: &str) -> PathBuf {
        let safe: String = character_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.sidecar_path(&format!(".{safe}.lock"))
    }

    fn ensure_parent(&self) -> EsiResult<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn open_lock_file(&self, path: &Path) -> EsiResult<File> {
        self.ensure_parent()?;
        Ok(owner_only(OpenOptions::new().read(true).write(true).create(true).truncate(false))
            .open(path)?)
    }

    /// Serializes whole-file read-modify-write cycles across processes.
    fn lock_file_for_write(&self) -> EsiResult<File> {
        let file = self.open_lock_file(&self.sidecar_path(".lock"))?;
        file.lock()?;
        Ok(file)
    }

    fn read_all(&self) -> EsiResult<CredentialFile> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(CredentialFile::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(CredentialFile::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_all(&self, records: &CredentialFile) -> EsiResult<()> {
        self.ensure_parent()?;
        let raw = serde_json::to_vec_pretty(records)?;
        let temp_path = self.sidecar_path(&format!(".tmp-{}", std::process::id()));

        {
            let mut temp = owner_only(OpenOptions::new().write(true).create(true).truncate(true))
                .open(&temp_path)?;
            temp.write_all(&raw)?;
            temp.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;
        restrict_permissions(&self.path)?;
        Ok(())
    }

    fn mutate(&self, operation: impl FnOnce(&mut CredentialFile)) -> EsiResult<()> {
        let _guard = self.lock_file_for_write()?;
        let mut records = self.read_all()?;
        operation(&mut records);
        self.write_all(&records)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, character_name: &str) -> EsiResult<Option<Credential>> {
        let mut records = self.read_all()?;
        Ok(records
            .remove(character_name)
            .map(|stored| stored.into_credential(character_name.to_owned())))
    }

    fn save(&self, credential: &Credential) -> EsiResult<()> {
        let stored = StoredCredential::from_credential(credential);
        self.mutate(|records| {
            records.insert(credential.character_name.clone(), stored);
        })?;
        log::debug!(
            "persisted credential for '{}' to {}",
            credential.character_name,
            self.path.display()
        );
        Ok(())
    }

    fn remove(&self, character_name: &str) -> EsiResult<()> {
        self.mutate(|records| {
            records.remove(character_name);
        })
    }

    fn character_names(&self) -> EsiResult<BTreeSet<String>> {
        Ok(self.read_all()?.into_keys().collect())
    }

    fn try_lock_character(&self, character_name: &str) -> EsiResult<Option<RefreshLock>> {
        let file = self.open_lock_file(&self.character_lock_path(character_name))?;
        match file.try_lock() {
            Ok(()) => Ok(Some(RefreshLock {
                held: HeldLock::File(file),
            })),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Error(err)) => Err(err.into()),
        }
    }
}

#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    options
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Default)]
pub struct MemoryTokenStore {
    credentials: Mutex<HashMap<String, Credential>>,
    held_locks: Arc<Mutex<HashSet<String>>>,
}

impl MemoryTokenStore {
    fn credentials(&self) -> std::sync::MutexGuard<'_, HashMap<String, Credential>> {
        match self.credentials.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, character_name: &str) -> EsiResult<Option<Credential>> {
        Ok(self.credentials().get(character_name).cloned())
    }

    fn save(&self, credential: &Credential) -> EsiResult<()> {
        self.credentials()
            .insert(credential.character_name.clone(), credential.clone());
        Ok(())
    }

    fn remove(&self, character_name: &str) -> EsiResult<()> {
        self.credentials().remove(character_name);
        Ok(())
    }

    fn character_names(&self) -> EsiResult<BTreeSet<String>> {
        Ok(self.credentials().keys().cloned().collect())
    }

    fn try_lock_character(&self, character_name: &str) -> EsiResult<Option<RefreshLock>> {
        let mut held = match self.held_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !held.insert(character_name.to_owned()) {
            return Ok(None);
        }

        Ok(Some(RefreshLock {
            held: HeldLock::Memory {
                character_name: character_name.to_owned(),
                held: Arc::clone(&self.held_locks),
            },
        }))
    }
}
