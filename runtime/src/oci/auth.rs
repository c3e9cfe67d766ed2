//! Credential resolution.
//!
//! The mutation engine never reads ambient state itself; it asks an injected
//! [`Authenticator`] once per repository coordinate and hands the resulting
//! [`Credential`] to every registry call of that operation.

use std::fmt;

use async_trait::async_trait;
use labelmod_core::config::AuthConfig;
use labelmod_core::error::Result;

use super::credentials::{CredentialStore, DockerConfig};

/// Credentials presented to a registry.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    #[default]
    Anonymous,
    Basic { username: String, password: String },
}

impl Credential {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Resolves credentials for a repository.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Credentials for `repository` on `registry`.
    async fn resolve(&self, registry: &str, repository: &str) -> Result<Credential>;
}

/// Always returns the same credential.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    credential: Credential,
}

impl StaticAuthenticator {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn resolve(&self, _registry: &str, _repository: &str) -> Result<Credential> {
        Ok(self.credential.clone())
    }
}

/// Username env var consulted after the on-disk stores.
pub const REGISTRY_USERNAME_ENV: &str = "REGISTRY_USERNAME";

/// Password env var consulted after the on-disk stores.
pub const REGISTRY_PASSWORD_ENV: &str = "REGISTRY_PASSWORD";

/// Looks credentials up in the local keychain.
///
/// Sources, first match wins:
/// 1. label-mod's credential store (`label-mod login`)
/// 2. Docker's `config.json` `auths`
/// 3. `REGISTRY_USERNAME` / `REGISTRY_PASSWORD`
/// 4. anonymous
pub struct KeychainAuthenticator {
    store: Option<CredentialStore>,
    docker: Option<DockerConfig>,
    env: Option<(String, String)>,
}

impl KeychainAuthenticator {
    pub fn new(store: Option<CredentialStore>, docker: Option<DockerConfig>) -> Self {
        Self {
            store,
            docker,
            env: None,
        }
    }

    /// Build from configuration, falling back to default paths.
    ///
    /// A missing home directory disables the file-backed sources instead of
    /// failing, so env credentials and anonymous access keep working.
    pub fn from_config(config: &AuthConfig) -> Self {
        let store = match &config.credentials_path {
            Some(path) => Some(CredentialStore::new(path.clone())),
            None => CredentialStore::default_path().ok(),
        };
        let docker = match &config.docker_config {
            Some(path) => Some(DockerConfig::new(path.clone())),
            None => DockerConfig::default_path().ok(),
        };
        Self::new(store, docker).with_env_credential(env_credential())
    }

    /// Set the credential used when no file source matches.
    pub fn with_env_credential(mut self, env: Option<(String, String)>) -> Self {
        self.env = env;
        self
    }
}

fn env_credential() -> Option<(String, String)> {
    let username = std::env::var(REGISTRY_USERNAME_ENV).ok()?;
    let password = std::env::var(REGISTRY_PASSWORD_ENV).ok()?;
    Some((username, password))
}

#[async_trait]
impl Authenticator for KeychainAuthenticator {
    async fn resolve(&self, registry: &str, repository: &str) -> Result<Credential> {
        if let Some(store) = &self.store {
            if let Some(credential) = store.credential(registry)? {
                tracing::debug!(registry, repository, source = "credential-store", "Resolved credentials");
                return Ok(credential);
            }
        }

        if let Some(docker) = &self.docker {
            if let Some(credential) = docker.credential(registry)? {
                tracing::debug!(registry, repository, source = "docker-config", "Resolved credentials");
                return Ok(credential);
            }
        }

        if let Some((username, password)) = &self.env {
            tracing::debug!(registry, repository, source = "env", "Resolved credentials");
            return Ok(Credential::basic(username.clone(), password.clone()));
        }

        tracing::debug!(registry, repository, "No credentials found, using anonymous access");
        Ok(Credential::Anonymous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keychain(dir: &TempDir) -> (KeychainAuthenticator, CredentialStore) {
        let store_path = dir.path().join("credentials.json");
        let docker_path = dir.path().join("config.json");
        let auth = KeychainAuthenticator::new(
            Some(CredentialStore::new(store_path.clone())),
            Some(DockerConfig::new(docker_path)),
        );
        (auth, CredentialStore::new(store_path))
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", Credential::basic("alice", "hunter2"));
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_static_authenticator() {
        let auth = StaticAuthenticator::new(Credential::basic("u", "p"));
        assert_eq!(
            auth.resolve("quay.io", "org/app").await.unwrap(),
            Credential::basic("u", "p")
        );
        assert!(StaticAuthenticator::anonymous()
            .resolve("quay.io", "org/app")
            .await
            .unwrap()
            .is_anonymous());
    }

    #[tokio::test]
    async fn test_keychain_falls_back_to_anonymous() {
        let dir = TempDir::new().unwrap();
        let (auth, _) = keychain(&dir);
        assert_eq!(
            auth.resolve("quay.io", "org/app").await.unwrap(),
            Credential::Anonymous
        );
    }

    #[tokio::test]
    async fn test_keychain_prefers_credential_store() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"auths": {"quay.io": {"username": "docker", "password": "d"}}}"#,
        )
        .unwrap();
        let (auth, store) = keychain(&dir);

        assert_eq!(
            auth.resolve("quay.io", "org/app").await.unwrap(),
            Credential::basic("docker", "d")
        );

        store.save_login("quay.io", "labelmod", "l").unwrap();
        assert_eq!(
            auth.resolve("quay.io", "org/app").await.unwrap(),
            Credential::basic("labelmod", "l")
        );
    }

    #[tokio::test]
    async fn test_keychain_uses_env_credential_last() {
        let dir = TempDir::new().unwrap();
        let (auth, store) = keychain(&dir);
        let auth = auth.with_env_credential(Some(("env".to_string(), "e".to_string())));

        assert_eq!(
            auth.resolve("ghcr.io", "org/app").await.unwrap(),
            Credential::basic("env", "e")
        );

        store.save_login("ghcr.io", "stored", "s").unwrap();
        assert_eq!(
            auth.resolve("ghcr.io", "org/app").await.unwrap(),
            Credential::basic("stored", "s")
        );
    }

    #[tokio::test]
    async fn test_keychain_from_config_paths() {
        let dir = TempDir::new().unwrap();
        let store_path = dir.path().join("creds.json");
        CredentialStore::new(store_path.clone())
            .save_login("docker.io", "hub", "h")
            .unwrap();

        let config = AuthConfig {
            credentials_path: Some(store_path),
            docker_config: Some(dir.path().join("missing.json")),
        };
        let auth = KeychainAuthenticator::from_config(&config).with_env_credential(None);

        assert_eq!(
            auth.resolve("docker.io", "library/nginx").await.unwrap(),
            Credential::basic("hub", "h")
        );
    }
}
