use anyhow::Result;
use std::fmt::Write;
use std::path::PathBuf;

use crate::bootstrap::{BootstrapOptions, Bootstrapper, PlannedStep};
use crate::plan::Plan;
use crate::runtime::Runtime;

/// Print what `run` would do without installing anything
#[tracing::instrument(skip(runtime, options))]
pub fn plan<R: Runtime>(
    runtime: R,
    options: BootstrapOptions,
    plan_path: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let plan = Plan::discover(&runtime, plan_path.as_deref())?;
    let bootstrapper = Bootstrapper::new(runtime, plan, &options)?;
    let manifest = bootstrapper.load_manifest()?;
    let steps = bootstrapper.describe(&manifest);

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
    } else {
        print!("{}", render_plan(&steps));
    }
    Ok(())
}

pub fn render_plan(steps: &[PlannedStep]) -> String {
    let mut out = String::new();
    for planned in steps {
        let _ = writeln!(out, "{}", planned.step);
        if !planned.packages.is_empty() {
            let _ = writeln!(out, "    packages: {}", planned.packages.join(", "));
        }
        match &planned.command {
            Some(command) => {
                let _ = writeln!(out, "    $ {}", command);
            }
            None => {
                let _ = writeln!(out, "    (nothing to install)");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Step;

    #[test]
    fn test_render_plan() {
        let steps = vec![
            PlannedStep {
                step: Step::UpgradeInstaller,
                title: Step::UpgradeInstaller.title(),
                packages: vec!["pip".into()],
                command: Some("python3 -m pip install --upgrade pip".into()),
            },
            PlannedStep {
                step: Step::InstallManifest,
                title: Step::InstallManifest.title(),
                packages: vec![],
                command: None,
            },
        ];

        assert_eq!(
            render_plan(&steps),
            "[1/4] Upgrade installer\n\
             \x20   packages: pip\n\
             \x20   $ python3 -m pip install --upgrade pip\n\
             [4/4] Install manifest\n\
             \x20   (nothing to install)\n"
        );
    }

    #[test]
    fn test_planned_step_json_shape() {
        let step = PlannedStep {
            step: Step::InstallPinnedNumerics,
            title: Step::InstallPinnedNumerics.title(),
            packages: vec!["numpy==1.23.5".into()],
            command: None,
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["step"], "install_pinned_numerics");
        assert_eq!(value["packages"][0], "numpy==1.23.5");
        assert!(value["command"].is_null());
    }
}
