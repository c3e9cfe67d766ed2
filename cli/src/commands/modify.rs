//! `label-mod modify-labels` command: removals and updates in one republish.
//!
//! Removals are applied before updates, so `--remove k --update k=v` leaves
//! `k` set to `v`.

use clap::Args;
use labelmod_runtime::LabelDelta;

use super::{run_mutation, GlobalArgs};

#[derive(Args)]
pub struct ModifyArgs {
    /// Image reference
    pub image: String,

    /// Label key to remove (repeatable)
    #[arg(long, value_name = "KEY")]
    pub remove: Vec<String>,

    /// Label to set, as key=value (repeatable)
    #[arg(long, value_name = "KEY=VALUE")]
    pub update: Vec<String>,

    /// Also push the result under this tag in the same repository (repeatable)
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

pub async fn execute(
    global: &GlobalArgs,
    args: ModifyArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let delta = LabelDelta::from_args(&args.remove, &args.update);
    run_mutation(global, &args.image, delta, &args.tags).await
}
