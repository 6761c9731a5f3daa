use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, ServerConfig, User};

pub const SCHEMA_VERSION: u32 = 1;

/// Read side of the user-management store, as far as probing is concerned.
pub trait UserDirectory {
    fn list_users(&self) -> Vec<User>;

    fn get_user(&self, user_id: &str) -> Option<User> {
        self.list_users().into_iter().find(|u| u.id == user_id)
    }
}

pub trait ServerConfigStore {
    fn server_config(&self) -> ServerConfig;

    fn set_server_config(&mut self, config: ServerConfig) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct StoreInit {
    pub data_dir: PathBuf,
    pub bootstrap_server_ip: Option<String>,
}

#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure on `path` (the data dir or `state.json`).
    Io { path: PathBuf, source: io::Error },
    SerdeJson(serde_json::Error),
    Domain(DomainError),
    SchemaVersionMismatch { expected: u32, got: u32 },
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::SerdeJson(e) => write!(f, "state.json: {e}"),
            Self::Domain(e) => write!(f, "{e}"),
            Self::SchemaVersionMismatch { expected, got } => {
                write!(f, "schema_version mismatch: expected {expected}, got {got}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::SerdeJson(e) => Some(e),
            Self::Domain(e) => Some(e),
            Self::SchemaVersionMismatch { .. } => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::SerdeJson(value)
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        Self::Domain(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedState {
    pub schema_version: u32,
    #[serde(default)]
    pub users: BTreeMap<String, User>,
    #[serde(default)]
    pub server_config: ServerConfig,
}

impl PersistedState {
    pub fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            users: BTreeMap::new(),
            server_config: ServerConfig::default(),
        }
    }
}

pub struct JsonSnapshotStore {
    state_path: PathBuf,
    state: PersistedState,
}

impl JsonSnapshotStore {
    pub fn load_or_init(init: StoreInit) -> Result<Self, StoreError> {
        fs::create_dir_all(&init.data_dir).map_err(StoreError::io(&init.data_dir))?;

        let state_path = init.data_dir.join("state.json");
        let (state, is_new_state) = if state_path.exists() {
            let bytes = fs::read(&state_path).map_err(StoreError::io(&state_path))?;
            let state: PersistedState = serde_json::from_slice(&bytes)?;
            if state.schema_version != SCHEMA_VERSION {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: SCHEMA_VERSION,
                    got: state.schema_version,
                });
            }
            (state, false)
        } else {
            let mut state = PersistedState::empty();
            if let Some(ip) = init.bootstrap_server_ip.filter(|ip| !ip.trim().is_empty()) {
                state.server_config.ip = ip.trim().to_string();
            }
            (state, true)
        };

        let store = Self { state_path, state };

        if is_new_state {
            store.save()?;
        }

        Ok(store)
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    pub fn save(&self) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&self.state)?;
        write_atomic(&self.state_path, &bytes).map_err(StoreError::io(&self.state_path))
    }

    pub fn upsert_user(&mut self, user: User) -> Result<(), StoreError> {
        self.state.users.insert(user.id.clone(), user);
        self.save()
    }

    pub fn delete_user(&mut self, user_id: &str) -> Result<User, StoreError> {
        let user = self
            .state
            .users
            .remove(user_id)
            .ok_or_else(|| DomainError::MissingUser {
                user_id: user_id.to_string(),
            })?;
        self.save()?;
        Ok(user)
    }
}

impl UserDirectory for JsonSnapshotStore {
    fn list_users(&self) -> Vec<User> {
        self.state.users.values().cloned().collect()
    }

    fn get_user(&self, user_id: &str) -> Option<User> {
        self.state.users.get(user_id).cloned()
    }
}

impl ServerConfigStore for JsonSnapshotStore {
    fn server_config(&self) -> ServerConfig {
        self.state.server_config.clone()
    }

    fn set_server_config(&mut self, config: ServerConfig) -> Result<(), StoreError> {
        let prev = std::mem::replace(&mut self.state.server_config, config);
        if let Err(err) = self.save() {
            self.state.server_config = prev;
            return Err(err);
        }
        Ok(())
    }
}

/// Replaces `path` through a sibling temp file so readers never see a
/// half-written snapshot. The temp file is removed when the write fails.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "snapshot path needs a parent dir and a file name",
        ));
    };
    let tmp_path = dir.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.write_all(b"\n")?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    #[cfg(unix)]
    if let Ok(dir) = fs::File::open(dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}
