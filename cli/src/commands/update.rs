//! `label-mod update-labels` command.

use clap::Args;
use labelmod_runtime::LabelDelta;

use super::{run_mutation, GlobalArgs};

#[derive(Args)]
pub struct UpdateArgs {
    /// Image reference
    pub image: String,

    /// Labels to set, as key=value
    #[arg(required = true, value_name = "KEY=VALUE")]
    pub labels: Vec<String>,

    /// Also push the result under this tag in the same repository (repeatable)
    #[arg(short, long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

pub async fn execute(
    global: &GlobalArgs,
    args: UpdateArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let delta = LabelDelta::from_args(&[], &args.labels);
    run_mutation(global, &args.image, delta, &args.tags).await
}
