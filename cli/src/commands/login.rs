//! `label-mod login` command: store registry credentials.

use std::io::BufRead;

use clap::Args;
use labelmod_core::config::AuthConfig;
use labelmod_runtime::CredentialStore;

use super::{load_config, GlobalArgs};

/// Registry used when no server is given.
pub(crate) const DEFAULT_SERVER: &str = "docker.io";

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (default: docker.io)
    pub server: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long, conflicts_with = "password_stdin")]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

/// Credential store honouring `auth.credentials_path`.
pub(crate) fn open_store(auth: &AuthConfig) -> labelmod_core::Result<CredentialStore> {
    match &auth.credentials_path {
        Some(path) => Ok(CredentialStore::new(path.clone())),
        None => CredentialStore::default_path(),
    }
}

fn read_line(prompt: Option<&str>) -> std::io::Result<String> {
    if let Some(prompt) = prompt {
        eprint!("{prompt}");
    }
    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

pub async fn execute(
    global: &GlobalArgs,
    args: LoginArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let server = args.server.unwrap_or_else(|| DEFAULT_SERVER.to_string());

    let username = match args.username {
        Some(u) => u,
        None => read_line(Some("Username: "))?,
    };

    let password = if args.password_stdin {
        read_line(None)?
    } else {
        match args.password {
            Some(p) => p,
            None => read_line(Some("Password: "))?,
        }
    };

    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".into());
    }

    let config = load_config(global)?;
    let store = open_store(&config.auth)?;
    let replaced = store.save_login(&server, &username, &password)?;
    tracing::info!(
        server = %server,
        path = %store.path().display(),
        replaced,
        "Stored credentials"
    );

    println!("Login Succeeded");
    Ok(0)
}
