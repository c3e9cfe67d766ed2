//! label-mod configuration.
//!
//! Configuration is layered: built-in defaults, then an optional YAML file,
//! then `LABEL_MOD_*` environment variables. The CLI applies its own flags on
//! top of the loaded value.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LabelModError, Result};

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "LABEL_MOD_CONFIG";

/// Comma-separated registries reached over plain HTTP.
pub const INSECURE_REGISTRIES_ENV: &str = "LABEL_MOD_INSECURE_REGISTRIES";

/// Number of extra-tag pushes allowed in flight at once.
pub const TAG_CONCURRENCY_ENV: &str = "LABEL_MOD_TAG_CONCURRENCY";

/// Per-push timeout in seconds.
pub const PUSH_TIMEOUT_ENV: &str = "LABEL_MOD_PUSH_TIMEOUT";

/// Top-level label-mod configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelModConfig {
    /// Registry transport settings
    pub registry: RegistryConfig,

    /// Mutation engine settings
    pub engine: EngineConfig,

    /// Credential source settings
    pub auth: AuthConfig,
}

/// Registry transport configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registries (host or host:port) reached over plain HTTP.
    ///
    /// Loopback registries are always treated as insecure.
    pub insecure: Vec<String>,
}

impl RegistryConfig {
    /// Whether `registry` should be contacted over HTTP instead of HTTPS.
    pub fn is_insecure(&self, registry: &str) -> bool {
        let host = registry.split(':').next().unwrap_or(registry);
        if host == "localhost" || host == "127.0.0.1" {
            return true;
        }
        self.insecure
            .iter()
            .any(|r| r.eq_ignore_ascii_case(registry) || r.eq_ignore_ascii_case(host))
    }
}

/// Mutation engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Extra-tag pushes in flight at once; 1 pushes tags strictly one by one
    pub tag_concurrency: usize,

    /// Upper bound for a single blob or manifest push, in seconds
    pub push_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tag_concurrency: 1,
            push_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Push timeout as a [`Duration`], if configured.
    pub fn push_timeout(&self) -> Option<Duration> {
        self.push_timeout_secs.map(Duration::from_secs)
    }
}

/// Credential source configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Override for the label-mod credential store path
    pub credentials_path: Option<PathBuf>,

    /// Override for Docker's `config.json`
    pub docker_config: Option<PathBuf>,
}

impl LabelModConfig {
    /// Load configuration from `path` (or `LABEL_MOD_CONFIG`), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(env_path);

        let mut config = match path {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            LabelModError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Self = serde_yaml::from_str(&data)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply `LABEL_MOD_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(list) = lookup(INSECURE_REGISTRIES_ENV) {
            for r in list.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                if !self.registry.insecure.iter().any(|existing| existing == r) {
                    self.registry.insecure.push(r.to_string());
                }
            }
        }

        if let Some(value) = lookup(TAG_CONCURRENCY_ENV) {
            self.engine.tag_concurrency = value.trim().parse().map_err(|_| {
                LabelModError::ConfigError(format!(
                    "{} must be a positive integer, got '{}'",
                    TAG_CONCURRENCY_ENV, value
                ))
            })?;
        }

        if let Some(value) = lookup(PUSH_TIMEOUT_ENV) {
            let secs: u64 = value.trim().parse().map_err(|_| {
                LabelModError::ConfigError(format!(
                    "{} must be a number of seconds, got '{}'",
                    PUSH_TIMEOUT_ENV, value
                ))
            })?;
            self.engine.push_timeout_secs = Some(secs);
        }

        self.validate()
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.tag_concurrency == 0 {
            return Err(LabelModError::ConfigError(
                "engine.tag_concurrency must be at least 1".to_string(),
            ));
        }
        if self.engine.push_timeout_secs == Some(0) {
            return Err(LabelModError::ConfigError(
                "engine.push_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = LabelModConfig::default();
        assert_eq!(config.engine.tag_concurrency, 1);
        assert!(config.engine.push_timeout().is_none());
        assert!(config.registry.insecure.is_empty());
        assert!(config.auth.credentials_path.is_none());
    }

    #[test]
    fn test_loopback_is_always_insecure() {
        let config = RegistryConfig::default();
        assert!(config.is_insecure("localhost"));
        assert!(config.is_insecure("localhost:5000"));
        assert!(config.is_insecure("127.0.0.1:5000"));
        assert!(!config.is_insecure("quay.io"));
    }

    #[test]
    fn test_listed_registry_is_insecure() {
        let config = RegistryConfig {
            insecure: vec!["registry.lan:5000".to_string()],
        };
        assert!(config.is_insecure("registry.lan:5000"));
        assert!(config.is_insecure("REGISTRY.LAN:5000"));
        assert!(!config.is_insecure("registry.example.com"));
    }

    #[test]
    fn test_from_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("label-mod.yaml");
        std::fs::write(
            &path,
            "registry:\n  insecure: [\"registry.lan:5000\"]\nengine:\n  tag_concurrency: 4\n  push_timeout_secs: 30\n",
        )
        .unwrap();

        let config = LabelModConfig::from_file(&path).unwrap();
        assert_eq!(config.registry.insecure, vec!["registry.lan:5000"]);
        assert_eq!(config.engine.tag_concurrency, 4);
        assert_eq!(config.engine.push_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("label-mod.yaml");
        std::fs::write(&path, "registry:\n  insecure: []\n").unwrap();

        let config = LabelModConfig::from_file(&path).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = LabelModConfig::from_file(Path::new("/nonexistent/label-mod.yaml")).unwrap_err();
        assert!(matches!(err, LabelModError::ConfigError(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LabelModConfig::default();
        config
            .apply_env(lookup_from(&[
                (INSECURE_REGISTRIES_ENV, "a.lan:5000, b.lan"),
                (TAG_CONCURRENCY_ENV, "3"),
                (PUSH_TIMEOUT_ENV, "15"),
            ]))
            .unwrap();

        assert_eq!(config.registry.insecure, vec!["a.lan:5000", "b.lan"]);
        assert_eq!(config.engine.tag_concurrency, 3);
        assert_eq!(config.engine.push_timeout_secs, Some(15));
    }

    #[test]
    fn test_env_rejects_bad_concurrency() {
        let mut config = LabelModConfig::default();
        assert!(config
            .apply_env(lookup_from(&[(TAG_CONCURRENCY_ENV, "many")]))
            .is_err());

        let mut config = LabelModConfig::default();
        assert!(config
            .apply_env(lookup_from(&[(TAG_CONCURRENCY_ENV, "0")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = LabelModConfig::default();
        config.engine.push_timeout_secs = Some(0);
        assert!(config.validate().is_err());
    }
}
