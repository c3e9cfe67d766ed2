//! `label-mod remove-labels` command.

use clap::Args;
use labelmod_runtime::LabelDelta;

use super::{run_mutation, GlobalArgs};

#[derive(Args)]
pub struct RemoveArgs {
    /// Image reference
    pub image: String,

    /// Label keys to remove
    #[arg(required = true, value_name = "KEY")]
    pub labels: Vec<String>,

    /// Also push the result under this tag in the same repository (repeatable)
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

pub async fn execute(
    global: &GlobalArgs,
    args: RemoveArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let delta = LabelDelta::remove(args.labels);
    run_mutation(global, &args.image, Ok(delta), &args.tags).await
}
