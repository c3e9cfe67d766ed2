//! `label-mod logout` command: remove stored registry credentials.

use clap::Args;
use labelmod_runtime::CredentialStore;

use super::login::{open_store, DEFAULT_SERVER};
use super::{load_config, GlobalArgs};

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server (default: docker.io)
    pub server: Option<String>,
}

pub async fn execute(
    global: &GlobalArgs,
    args: LogoutArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let server = args.server.unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let config = load_config(global)?;
    let store = open_store(&config.auth)?;
    println!("{}", logout(&store, &server)?);
    Ok(0)
}

/// Forget `server` and describe what happened.
fn logout(store: &CredentialStore, server: &str) -> labelmod_core::Result<String> {
    if store.forget(server)? {
        return Ok(format!("Removing login credentials for {}", server));
    }

    let known = store.servers()?;
    if known.is_empty() {
        Ok(format!("Not logged in to {}", server))
    } else {
        Ok(format!(
            "Not logged in to {} (stored logins: {})",
            server,
            known.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logout_removes_login() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        store.save_login("quay.io", "robot", "token").unwrap();

        assert_eq!(
            logout(&store, "quay.io").unwrap(),
            "Removing login credentials for quay.io"
        );
        assert!(store.servers().unwrap().is_empty());
    }

    #[test]
    fn test_logout_unknown_server_lists_stored_logins() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("creds.json"));
        assert_eq!(logout(&store, "quay.io").unwrap(), "Not logged in to quay.io");

        store.save_login("ghcr.io", "robot", "token").unwrap();
        store.save_login("docker.io", "hub", "h").unwrap();
        assert_eq!(
            logout(&store, "quay.io").unwrap(),
            "Not logged in to quay.io (stored logins: ghcr.io, index.docker.io)"
        );
    }
}
