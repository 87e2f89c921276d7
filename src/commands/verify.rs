use anyhow::Result;

use crate::bootstrap::{BootstrapError, BootstrapOptions};
use crate::installer::Installer;
use crate::package::PackageSpec;
use crate::plan::Plan;
use crate::runtime::Runtime;
use crate::verify::{VerifyReport, verify_pins};

/// Check that every pin is installed at exactly its version
#[tracing::instrument(skip(runtime, options))]
pub async fn verify<R: Runtime>(
    runtime: R,
    options: BootstrapOptions,
    plan_path: Option<std::path::PathBuf>,
) -> Result<()> {
    let plan = Plan::discover(&runtime, plan_path.as_deref())?;
    let installer = Installer::new(&options.python);
    check_pins(&runtime, &installer, &plan.pins()).await
}

pub(super) async fn check_pins<R: Runtime>(
    runtime: &R,
    installer: &Installer,
    pins: &[PackageSpec],
) -> Result<()> {
    let report = verify_pins(runtime, installer, pins).await?;
    print_verify_report(&report);

    if report.is_ok() {
        Ok(())
    } else {
        Err(BootstrapError::VerificationFailed {
            mismatches: report.mismatches.len(),
        }
        .into())
    }
}

pub fn print_verify_report(report: &VerifyReport) {
    for pin in &report.checked {
        match report.mismatches.iter().find(|m| m.pin == *pin) {
            Some(mismatch) => println!("  MISMATCH {}", mismatch),
            None => println!("  ok       {}", pin),
        }
    }
}
