//! Bootstrap use case - provisions the package environment in four fixed steps.
//!
//! 1. Upgrade the installer (unpinned)
//! 2. Install the pinned build tools
//! 3. Install the pinned numerics
//! 4. Install the manifest, with every pin taking precedence over it
//!
//! The first failing step stops the run.

mod error;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use serde::Serialize;

use crate::cleanup::{self, SharedCleanupContext};
use crate::installer::Installer;
use crate::package::{Manifest, PackageSpec, PinOverride};
use crate::plan::{Plan, Step};
use crate::runtime::{Invocation, Runtime, absolutize};

pub use error::{BootstrapError, SPAWN_FAILED_EXIT_CODE, exit_code_for};

/// Default manifest, resolved against the working directory.
pub const DEFAULT_MANIFEST: &str = "requirements.txt";

/// Options for the bootstrap use case
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Requirements manifest installed in the last step
    pub manifest: PathBuf,
    /// Python interpreter used to run pip
    pub python: String,
    /// Extra arguments passed to every pip install
    pub pip_args: Vec<String>,
    /// Pass -q to pip
    pub quiet: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from(DEFAULT_MANIFEST),
            python: crate::installer::DEFAULT_PYTHON.to_string(),
            pip_args: Vec::new(),
            quiet: false,
        }
    }
}

/// One step as it will run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub step: Step,
    pub title: &'static str,
    /// Packages named on the command line of this step
    pub packages: Vec<String>,
    /// None when the step has nothing to do
    pub command: Option<String>,
}

/// Outcome of a completed run.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub completed: Vec<Step>,
    /// Manifest requirements replaced by pins
    pub overrides: Vec<PinOverride>,
    pub manifest_skipped: bool,
}

/// Files generated for the manifest step, named after this process.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GeneratedFiles {
    manifest: PathBuf,
    constraints: PathBuf,
}

impl GeneratedFiles {
    /// Placed next to the original manifest so relative references in it still resolve.
    fn beside(manifest: &Path) -> Self {
        let dir = manifest.parent().unwrap_or_else(|| Path::new("."));
        let id = std::process::id();
        Self {
            manifest: dir.join(format!(".depboot-{}.requirements.txt", id)),
            constraints: dir.join(format!(".depboot-{}.constraints.txt", id)),
        }
    }
}

pub struct Bootstrapper<R: Runtime> {
    runtime: R,
    plan: Plan,
    installer: Installer,
    manifest_path: PathBuf,
}

impl<R: Runtime> Bootstrapper<R> {
    pub fn new(runtime: R, plan: Plan, options: &BootstrapOptions) -> Result<Self> {
        plan.validate()?;
        let manifest_path = absolutize(&runtime.current_dir()?, &options.manifest);
        let installer = Installer::new(&options.python)
            .with_extra_args(options.pip_args.clone())
            .quiet(options.quiet);

        Ok(Self {
            runtime,
            plan,
            installer,
            manifest_path,
        })
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Read and parse the manifest. Missing manifests are an error.
    #[tracing::instrument(skip(self))]
    pub fn load_manifest(&self) -> Result<Manifest> {
        if !self.runtime.exists(&self.manifest_path) {
            bail!(
                "Manifest {} does not exist. Use --manifest to point at your requirements file.",
                self.manifest_path.display()
            );
        }
        Manifest::load(&self.runtime, &self.manifest_path)
    }

    /// The invocation a step would run, or None when it has nothing to install.
    fn invocation_for(&self, step: Step, manifest: &Manifest) -> Option<Invocation> {
        match step {
            Step::UpgradeInstaller => Some(self.installer.upgrade(&self.plan.installer)),
            Step::InstallBuildTools | Step::InstallPinnedNumerics => {
                let pins = self.plan.pins_for(step);
                (!pins.is_empty()).then(|| self.installer.install_pins(pins))
            }
            Step::InstallManifest => {
                let files = GeneratedFiles::beside(&self.manifest_path);
                manifest
                    .has_installables()
                    .then(|| self.installer.install_manifest(&files.manifest, &files.constraints))
            }
        }
    }

    /// Describe every step without running anything.
    pub fn describe(&self, manifest: &Manifest) -> Vec<PlannedStep> {
        Step::ALL
            .iter()
            .map(|&step| {
                let packages = match step {
                    Step::UpgradeInstaller => vec![self.plan.installer.clone()],
                    Step::InstallManifest => manifest
                        .requirements()
                        .map(|r| match self.plan.pins().iter().find(|p| p.matches(&r.name)) {
                            Some(pin) => pin.to_string(),
                            None => format!("{}{}", r.name, r.specifier),
                        })
                        .collect(),
                    _ => self
                        .plan
                        .pins_for(step)
                        .iter()
                        .map(|p| p.to_string())
                        .collect(),
                };
                PlannedStep {
                    step,
                    title: step.title(),
                    packages,
                    command: self.invocation_for(step, manifest).map(|i| i.to_string()),
                }
            })
            .collect()
    }

    /// Run all four steps in order, stopping at the first failure.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<BootstrapReport> {
        let manifest = self.load_manifest()?;

        if self.runtime.is_privileged() {
            warn!(
                "Running with elevated privileges; packages will be installed into the system environment."
            );
        }

        let mut report = BootstrapReport::default();

        for step in Step::ALL {
            println!("==> {}", step);
            info!("Starting step {}", step);

            match step {
                Step::InstallManifest => {
                    if !manifest.has_installables() {
                        println!("    Nothing to install from {}", self.manifest_path.display());
                        info!("Manifest has no requirements, skipping step {}", step);
                        report.manifest_skipped = true;
                    } else {
                        report.overrides = self.install_manifest(&manifest).await?;
                    }
                }
                _ => match self.invocation_for(step, &manifest) {
                    Some(invocation) => self.execute(step, &invocation).await?,
                    None => {
                        println!("    Nothing to install");
                        debug!("No packages configured for step {}", step);
                    }
                },
            }

            report.completed.push(step);
        }

        println!("==> Done");
        Ok(report)
    }

    /// Run one invocation, turning a non-zero exit into a step failure.
    async fn execute(&self, step: Step, invocation: &Invocation) -> Result<()> {
        println!("    $ {}", invocation);
        let code = self.runtime.run(invocation).await.map_err(|e| {
            anyhow::Error::from(BootstrapError::SpawnFailed {
                step,
                program: invocation.program.clone(),
                reason: format!("{:#}", e),
            })
        })?;

        if code != 0 {
            warn!("Step {} exited with code {}", step, code);
            return Err(BootstrapError::StepFailed { step, code }.into());
        }
        Ok(())
    }

    /// Write the effective manifest and the pin constraints, install, then remove both files.
    async fn install_manifest(&self, manifest: &Manifest) -> Result<Vec<PinOverride>> {
        let pins = self.plan.pins();
        let (effective, overrides) = manifest.rewrite_with_pins(&pins);

        for o in &overrides {
            if o.conflicts() {
                warn!(
                    "{} declares '{}{}'; installing pinned {} instead",
                    self.manifest_path.display(),
                    o.declared.name,
                    o.declared.specifier,
                    o.pin
                );
            } else {
                debug!("{} already pinned to {}", o.declared.name, o.pin.version);
            }
        }

        let files = GeneratedFiles::beside(&self.manifest_path);
        let ctx = cleanup::new_shared();
        let watcher = cleanup::cleanup_on_interrupt(Arc::clone(&ctx));

        let result = self
            .install_generated(&files, &effective, &pins, &ctx)
            .await;

        // The SIGINT handler tokio installed stays registered after abort, so
        // a later Ctrl-C no longer terminates the process by default.
        watcher.abort();
        self.remove_generated(&files, &ctx);

        result.map(|()| overrides)
    }

    async fn install_generated(
        &self,
        files: &GeneratedFiles,
        effective: &str,
        pins: &[PackageSpec],
        ctx: &SharedCleanupContext,
    ) -> Result<()> {
        let constraints: String = pins.iter().map(|p| format!("{}\n", p)).collect();

        for (path, contents) in [
            (&files.manifest, effective),
            (&files.constraints, constraints.as_str()),
        ] {
            if let Ok(mut guard) = ctx.lock() {
                guard.add(path.clone());
            }
            self.runtime
                .write(path, contents.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!("Wrote {}", path.display());
        }

        let invocation = self
            .installer
            .install_manifest(&files.manifest, &files.constraints);
        self.execute(Step::InstallManifest, &invocation).await
    }

    fn remove_generated(&self, files: &GeneratedFiles, ctx: &SharedCleanupContext) {
        for path in [&files.manifest, &files.constraints] {
            if self.runtime.exists(path) {
                if let Err(e) = self.runtime.remove_file(path) {
                    warn!("Failed to remove {}: {:#}", path.display(), e);
                }
            }
            if let Ok(mut guard) = ctx.lock() {
                guard.remove(path);
            }
        }
    }
}
