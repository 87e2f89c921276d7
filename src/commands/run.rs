use anyhow::Result;
use log::debug;
use std::path::PathBuf;

use crate::bootstrap::{BootstrapOptions, Bootstrapper};
use crate::plan::Plan;
use crate::runtime::Runtime;

use super::verify::check_pins;

/// Provision the environment, optionally verifying the pins afterwards
#[tracing::instrument(skip(runtime, options))]
pub async fn run<R: Runtime>(
    runtime: R,
    options: BootstrapOptions,
    plan_path: Option<PathBuf>,
    verify: bool,
) -> Result<()> {
    let plan = Plan::discover(&runtime, plan_path.as_deref())?;
    debug!("Plan: {:?}", plan);

    let bootstrapper = Bootstrapper::new(runtime, plan, &options)?;
    let report = bootstrapper.run().await?;

    for o in report.overrides.iter().filter(|o| o.conflicts()) {
        println!(
            "Pinned {} over '{}{}' from {}",
            o.pin,
            o.declared.name,
            o.declared.specifier,
            bootstrapper.manifest_path().display()
        );
    }

    if verify {
        check_pins(
            bootstrapper.runtime(),
            bootstrapper.installer(),
            &bootstrapper.plan().pins(),
        )
        .await?;
    }

    Ok(())
}
