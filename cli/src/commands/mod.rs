//! CLI command definitions and dispatch.

mod inspect;
mod login;
mod logout;
mod modify;
mod remove;
mod update;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use labelmod_core::LabelModConfig;
use labelmod_runtime::{
    CancelFlag, KeychainAuthenticator, LabelDelta, LabelMutator, MutationOutcome,
    OciRegistryClient,
};

use crate::output;

/// label-mod: edit the labels of container images in place, in the registry.
#[derive(Parser)]
#[command(name = "label-mod", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (YAML); defaults to $LABEL_MOD_CONFIG when set
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Reach this registry over plain HTTP (repeatable)
    #[arg(long = "insecure", global = true, value_name = "REGISTRY")]
    pub insecure: Vec<String>,

    /// Number of extra-tag pushes in flight at once
    #[arg(long, global = true, value_name = "N")]
    pub tag_concurrency: Option<usize>,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Print the current labels of an image
    #[command(alias = "inspect")]
    Test(inspect::InspectArgs),
    /// Remove labels from an image
    RemoveLabels(remove::RemoveArgs),
    /// Add or overwrite labels on an image
    UpdateLabels(update::UpdateArgs),
    /// Remove and update labels in one republish
    ModifyLabels(modify::ModifyArgs),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
///
/// Returns the process exit status.
pub async fn dispatch(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let global = cli.global;
    match cli.command {
        Command::Test(args) => inspect::execute(&global, args).await,
        Command::RemoveLabels(args) => remove::execute(&global, args).await,
        Command::UpdateLabels(args) => update::execute(&global, args).await,
        Command::ModifyLabels(args) => modify::execute(&global, args).await,
        Command::Login(args) => login::execute(&global, args).await,
        Command::Logout(args) => logout::execute(&global, args).await,
    }
}

/// Load configuration and layer the command-line flags on top.
pub(crate) fn load_config(global: &GlobalArgs) -> labelmod_core::Result<LabelModConfig> {
    let mut config = LabelModConfig::load(global.config.as_deref())?;

    for registry in &global.insecure {
        if !config.registry.insecure.contains(registry) {
            config.registry.insecure.push(registry.clone());
        }
    }
    if let Some(n) = global.tag_concurrency {
        config.engine.tag_concurrency = n;
    }

    config.validate()?;
    Ok(config)
}

/// Build a mutator talking to real registries with keychain credentials.
///
/// Ctrl-C stops it from issuing further pushes.
pub(crate) fn build_mutator(config: &LabelModConfig) -> LabelMutator {
    let registry = Arc::new(OciRegistryClient::new(config.registry.clone()));
    let authenticator = Arc::new(KeychainAuthenticator::from_config(&config.auth));
    let mutator = LabelMutator::new(registry, authenticator).with_config(config.engine.clone());
    cancel_on_ctrl_c(mutator.cancel_flag());
    mutator
}

/// Exit status used when a second interrupt aborts the process.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// The first Ctrl-C cancels the mutator: pending reads are dropped and no new
/// push is issued. A second Ctrl-C exits at once, even mid-push.
fn cancel_on_ctrl_c(flag: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted; no further pushes will be issued (Ctrl-C again to abort)");
        flag.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Aborted");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    });
}

/// Shared body of the three mutation commands.
///
/// Argument and configuration errors are reported through the outcome
/// document like any other failure.
pub(crate) async fn run_mutation(
    global: &GlobalArgs,
    image: &str,
    delta: labelmod_core::Result<LabelDelta>,
    tags: &[String],
) -> Result<i32, Box<dyn std::error::Error>> {
    let prepared = delta.and_then(|delta| load_config(global).map(|config| (delta, config)));
    let (delta, config) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            let mut outcome = MutationOutcome::new(image);
            outcome.fail(&e);
            return output::emit_mutation(&outcome);
        }
    };

    tracing::debug!(
        image,
        removals = delta.removals.len(),
        updates = delta.updates.len(),
        tags = tags.len(),
        "Starting label mutation"
    );
    let outcome = build_mutator(&config).mutate(image, &delta, tags).await;
    output::emit_mutation(&outcome)
}
