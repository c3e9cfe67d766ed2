//! `label-mod test` command: print an image's current labels.

use clap::Args;
use labelmod_runtime::InspectOutcome;

use super::{build_mutator, load_config, GlobalArgs};
use crate::output;

#[derive(Args)]
pub struct InspectArgs {
    /// Image reference (e.g., "quay.io/org/app:v1")
    pub image: String,
}

pub async fn execute(
    global: &GlobalArgs,
    args: InspectArgs,
) -> Result<i32, Box<dyn std::error::Error>> {
    let config = match load_config(global) {
        Ok(config) => config,
        Err(e) => {
            let mut outcome = InspectOutcome::new(&args.image);
            outcome.fail(&e);
            return output::emit_inspect(&outcome);
        }
    };

    let outcome = build_mutator(&config).inspect(&args.image).await;
    output::emit_inspect(&outcome)
}
