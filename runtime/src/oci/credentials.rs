//! Registry credential sources on disk.
//!
//! [`CredentialStore`] is label-mod's own store at
//! `~/.label-mod/auth/credentials.json`, written by `label-mod login`.
//! [`DockerConfig`] reads the `auths` section of Docker's `config.json` so
//! that an existing `docker login` is picked up without re-entering secrets.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use labelmod_core::error::{LabelModError, Result};
use serde::{Deserialize, Serialize};

use super::auth::Credential;

/// A username/password pair saved by `label-mod login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLogin {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for StoredLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredLogin")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl From<StoredLogin> for Credential {
    fn from(login: StoredLogin) -> Self {
        Credential::basic(login.username, login.password)
    }
}

/// On-disk layout; entries are keyed by normalised registry host and kept
/// sorted so the file diffs cleanly.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    registries: BTreeMap<String, StoredLogin>,
}

/// label-mod's own credential file.
///
/// Every call reads the file afresh; nothing is cached between operations.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// `~/.label-mod/auth/credentials.json`
    pub fn default_path() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            LabelModError::ConfigError(
                "Cannot determine home directory for credential store".to_string(),
            )
        })?;
        Ok(Self::new(
            home.join(".label-mod").join("auth").join("credentials.json"),
        ))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a login for `server`. Returns true when an earlier login was replaced.
    pub fn save_login(&self, server: &str, username: &str, password: &str) -> Result<bool> {
        let mut file = self.read()?;
        let previous = file.registries.insert(
            normalize_registry(server),
            StoredLogin {
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        self.write(&file)?;
        Ok(previous.is_some())
    }

    /// Credential saved for `registry`, if any.
    pub fn credential(&self, registry: &str) -> Result<Option<Credential>> {
        Ok(self.login(registry)?.map(Credential::from))
    }

    /// Raw login saved for `registry`, if any.
    pub fn login(&self, registry: &str) -> Result<Option<StoredLogin>> {
        let mut file = self.read()?;
        Ok(file.registries.remove(&normalize_registry(registry)))
    }

    /// Drop the login for `server`. Returns false when there was none.
    pub fn forget(&self, server: &str) -> Result<bool> {
        let mut file = self.read()?;
        if file.registries.remove(&normalize_registry(server)).is_none() {
            return Ok(false);
        }
        self.write(&file)?;
        Ok(true)
    }

    /// Registries with a saved login, sorted.
    pub fn servers(&self) -> Result<Vec<String>> {
        Ok(self.read()?.registries.into_keys().collect())
    }

    fn read(&self) -> Result<StoreFile> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(store_error("read", &self.path, e)),
        };
        serde_json::from_slice(&data).map_err(|e| store_error("parse", &self.path, e))
    }

    /// Replace the file through a sibling temp file so readers never see a
    /// partial write. The file holds secrets and is created owner-only.
    fn write(&self, file: &StoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| store_error("create", parent, e))?;
        }

        let data = serde_json::to_vec_pretty(file).map_err(|e| store_error("encode", &self.path, e))?;
        let tmp_path = self.path.with_extension("tmp");

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut tmp = options
            .open(&tmp_path)
            .map_err(|e| store_error("write", &tmp_path, e))?;
        tmp.write_all(&data)
            .and_then(|_| tmp.sync_all())
            .map_err(|e| store_error("write", &tmp_path, e))?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| store_error("replace", &self.path, e))
    }
}

fn store_error(action: &str, path: &Path, err: impl std::fmt::Display) -> LabelModError {
    LabelModError::ConfigError(format!(
        "Failed to {} credential store {}: {}",
        action,
        path.display(),
        err
    ))
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Read-only view of Docker's `config.json`.
///
/// Only inline `auths` entries are understood; credential helpers
/// (`credsStore`, `credHelpers`) are ignored.
pub struct DockerConfig {
    path: PathBuf,
}

impl DockerConfig {
    /// `$DOCKER_CONFIG/config.json`, or `~/.docker/config.json`.
    pub fn default_path() -> Result<Self> {
        if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
            return Ok(Self::new(PathBuf::from(dir).join("config.json")));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            LabelModError::ConfigError(
                "Cannot determine home directory for docker config".to_string(),
            )
        })?;
        Ok(Self::new(home.join(".docker").join("config.json")))
    }

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Look up the credential for a registry.
    ///
    /// Keys in `auths` may be bare hosts or URLs such as
    /// `https://index.docker.io/v1/`; both forms match.
    pub fn credential(&self, registry: &str) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            LabelModError::ConfigError(format!(
                "Failed to read docker config {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let file: DockerConfigFile = serde_json::from_str(&data).map_err(|e| {
            LabelModError::ConfigError(format!(
                "Failed to parse docker config {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let wanted = normalize_registry(registry);
        let Some(entry) = file
            .auths
            .iter()
            .find(|(key, _)| normalize_registry(strip_url(key)) == wanted)
            .map(|(_, entry)| entry)
        else {
            return Ok(None);
        };

        if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
            return Ok(Some(Credential::basic(username.clone(), password.clone())));
        }

        match &entry.auth {
            Some(encoded) if !encoded.is_empty() => {
                let (username, password) = decode_auth(encoded)?;
                Ok(Some(Credential::basic(username, password)))
            }
            _ => Ok(None),
        }
    }
}

fn strip_url(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

fn decode_auth(encoded: &str) -> Result<(String, String)> {
    let decoded = STANDARD.decode(encoded.trim()).map_err(|e| {
        LabelModError::ConfigError(format!("Invalid base64 in docker config auth: {}", e))
    })?;
    let decoded = String::from_utf8(decoded).map_err(|e| {
        LabelModError::ConfigError(format!("Docker config auth is not UTF-8: {}", e))
    })?;
    let (username, password) = decoded.split_once(':').ok_or_else(|| {
        LabelModError::ConfigError("Docker config auth is not user:password".to_string())
    })?;
    Ok((username.to_string(), password.to_string()))
}

/// Normalize registry names (e.g., "docker.io" and "index.docker.io" → "index.docker.io").
pub fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r
    }
}
