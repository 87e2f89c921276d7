//! CLI commands. Each takes the runtime and the parsed options and prints its own output.

mod plan;
mod run;
mod verify;

pub use plan::{plan, render_plan};
pub use run::run;
pub use verify::{print_verify_report, verify};
