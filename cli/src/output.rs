//! Outcome printing.
//!
//! Every operation prints exactly one pretty-printed JSON document on stdout
//! and derives the process exit status from its `success` flag.

use labelmod_runtime::{InspectOutcome, MutationOutcome};
use serde::Serialize;

/// Render a document the way it is printed.
pub fn render<T: Serialize>(document: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(document)
}

fn print<T: Serialize>(document: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render(document)?);
    Ok(())
}

/// Print a mutation outcome. Returns the exit status.
pub fn emit_mutation(outcome: &MutationOutcome) -> Result<i32, Box<dyn std::error::Error>> {
    print(outcome)?;
    Ok(outcome.exit_code())
}

/// Print an inspect outcome. Returns the exit status.
pub fn emit_inspect(outcome: &InspectOutcome) -> Result<i32, Box<dyn std::error::Error>> {
    print(outcome)?;
    Ok(outcome.exit_code())
}
