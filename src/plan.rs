//! Provisioning plan: the fixed step order and the pins each step installs.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::package::{PackageSpec, is_valid_name, normalize_name};
use crate::runtime::{Runtime, absolutize};

/// Plan file looked up in the working directory.
pub const LOCAL_PLAN_FILE: &str = "depboot.json";

/// One stage of the bootstrap. Stages always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    UpgradeInstaller,
    InstallBuildTools,
    InstallPinnedNumerics,
    InstallManifest,
}

impl Step {
    pub const ALL: [Step; 4] = [
        Step::UpgradeInstaller,
        Step::InstallBuildTools,
        Step::InstallPinnedNumerics,
        Step::InstallManifest,
    ];

    /// 1-based position in the run.
    pub fn number(self) -> usize {
        match self {
            Step::UpgradeInstaller => 1,
            Step::InstallBuildTools => 2,
            Step::InstallPinnedNumerics => 3,
            Step::InstallManifest => 4,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Step::UpgradeInstaller => "Upgrade installer",
            Step::InstallBuildTools => "Install build tools",
            Step::InstallPinnedNumerics => "Install pinned numerics",
            Step::InstallManifest => "Install manifest",
        }
    }

    pub fn next(self) -> Option<Step> {
        Step::ALL.get(self.number()).copied()
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.number(), Step::ALL.len(), self.title())
    }
}

/// What the bootstrap installs, step by step.
///
/// ```json
/// {
///   "installer": "pip",
///   "build_tools": ["setuptools==68.2.2", "wheel==0.41.2"],
///   "numerics": ["numpy==1.23.5", "pandas==1.5.3"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Plan {
    /// Installer package upgraded in the first step (never pinned).
    pub installer: String,
    pub build_tools: Vec<PackageSpec>,
    pub numerics: Vec<PackageSpec>,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            installer: "pip".to_string(),
            build_tools: vec![
                PackageSpec::new("setuptools", "68.2.2"),
                PackageSpec::new("wheel", "0.41.2"),
            ],
            numerics: vec![
                PackageSpec::new("numpy", "1.23.5"),
                PackageSpec::new("pandas", "1.5.3"),
            ],
        }
    }
}

impl Plan {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let plan: Plan = serde_json::from_str(&content)
            .with_context(|| format!("Invalid plan file {}", path.display()))?;
        plan.validate()
            .with_context(|| format!("Invalid plan file {}", path.display()))?;
        Ok(plan)
    }

    /// Find the plan to use.
    ///
    /// An explicit path must exist. Otherwise `./depboot.json`, then
    /// `<config dir>/depboot/plan.json`, then the built-in plan.
    #[tracing::instrument(skip(runtime))]
    pub fn discover<R: Runtime>(runtime: &R, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let path = absolutize(&runtime.current_dir()?, path);
            if !runtime.exists(&path) {
                bail!("Plan file {} does not exist.", path.display());
            }
            info!("Using plan file {}", path.display());
            return Self::load(runtime, &path);
        }

        for candidate in Self::candidates(runtime)? {
            debug!("Looking for plan file at {}", candidate.display());
            if runtime.exists(&candidate) {
                info!("Using plan file {}", candidate.display());
                return Self::load(runtime, &candidate);
            }
        }

        debug!("No plan file found, using built-in plan");
        Ok(Self::default())
    }

    fn candidates<R: Runtime>(runtime: &R) -> Result<Vec<PathBuf>> {
        let mut candidates = vec![runtime.current_dir()?.join(LOCAL_PLAN_FILE)];
        if let Some(config_dir) = runtime.config_dir() {
            candidates.push(config_dir.join("depboot").join("plan.json"));
        }
        Ok(candidates)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.installer) {
            bail!("Invalid installer package name '{}'.", self.installer);
        }

        let mut seen = HashSet::new();
        seen.insert(normalize_name(&self.installer));
        for pin in self.pins() {
            if !seen.insert(pin.key()) {
                bail!("Package '{}' appears more than once in the plan.", pin.name);
            }
        }
        Ok(())
    }

    /// Every pinned package, build tools first.
    pub fn pins(&self) -> Vec<PackageSpec> {
        self.build_tools
            .iter()
            .chain(self.numerics.iter())
            .cloned()
            .collect()
    }

    /// Pins installed by `step`. Empty for the installer upgrade and the manifest.
    pub fn pins_for(&self, step: Step) -> &[PackageSpec] {
        match step {
            Step::InstallBuildTools => self.build_tools.as_slice(),
            Step::InstallPinnedNumerics => self.numerics.as_slice(),
            Step::UpgradeInstaller | Step::InstallManifest => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use crate::test_utils::{configure_mock_runtime_basics, test_config_dir, test_workdir};
    use mockall::predicate::eq;

    #[test]
    fn test_steps_are_strictly_linear() {
        assert_eq!(Step::UpgradeInstaller.next(), Some(Step::InstallBuildTools));
        assert_eq!(Step::InstallBuildTools.next(), Some(Step::InstallPinnedNumerics));
        assert_eq!(Step::InstallPinnedNumerics.next(), Some(Step::InstallManifest));
        assert_eq!(Step::InstallManifest.next(), None);
        assert_eq!(Step::InstallBuildTools.to_string(), "[2/4] Install build tools");
    }

    #[test]
    fn test_default_plan_pins() {
        let plan = Plan::default();
        let pins: Vec<String> = plan.pins().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            pins,
            vec![
                "setuptools==68.2.2",
                "wheel==0.41.2",
                "numpy==1.23.5",
                "pandas==1.5.3"
            ]
        );
        assert_eq!(plan.installer, "pip");
        assert!(plan.pins_for(Step::UpgradeInstaller).is_empty());
        assert!(plan.pins_for(Step::InstallManifest).is_empty());
        assert_eq!(plan.pins_for(Step::InstallPinnedNumerics).len(), 2);
        plan.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let plan = Plan {
            numerics: vec![
                PackageSpec::new("numpy", "1.23.5"),
                PackageSpec::new("NumPy", "1.24.0"),
            ],
            ..Plan::default()
        };
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let plan = Plan {
            build_tools: vec![PackageSpec::new("pip", "23.3")],
            ..Plan::default()
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_load_partial_plan_keeps_defaults() {
        let mut runtime = MockRuntime::new();
        let path = test_workdir().join("depboot.json");
        runtime
            .expect_read_to_string()
            .with(eq(path.clone()))
            .returning(|_| Ok(r#"{"numerics": ["numpy==1.26.4"]}"#.to_string()));

        let plan = Plan::load(&runtime, &path).unwrap();
        assert_eq!(plan.numerics, vec![PackageSpec::new("numpy", "1.26.4")]);
        assert_eq!(plan.build_tools, Plan::default().build_tools);
    }

    #[test]
    fn test_load_rejects_unknown_fields_and_ranges() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(r#"{"numeric": []}"#.to_string()));
        assert!(Plan::load(&runtime, Path::new("plan.json")).is_err());

        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok(r#"{"numerics": ["numpy>=1.24"]}"#.to_string()));
        let err = Plan::load(&runtime, Path::new("plan.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid plan file"));
    }

    #[test]
    fn test_discover_falls_back_to_builtin() {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_basics(&mut runtime);
        runtime.expect_exists().returning(|_| false);

        let plan = Plan::discover(&runtime, None).unwrap();
        assert_eq!(plan, Plan::default());
    }

    #[test]
    fn test_discover_prefers_local_file() {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_basics(&mut runtime);
        let local = test_workdir().join(LOCAL_PLAN_FILE);
        runtime
            .expect_exists()
            .with(eq(local.clone()))
            .returning(|_| true);
        runtime
            .expect_read_to_string()
            .with(eq(local))
            .returning(|_| Ok(r#"{"installer": "pip"}"#.to_string()));

        let plan = Plan::discover(&runtime, None).unwrap();
        assert_eq!(plan, Plan::default());
    }

    #[test]
    fn test_discover_uses_config_dir() {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_basics(&mut runtime);
        let global = test_config_dir().join("depboot").join("plan.json");
        let global_clone = global.clone();
        runtime
            .expect_exists()
            .returning(move |p| p == global_clone.as_path());
        runtime
            .expect_read_to_string()
            .with(eq(global))
            .returning(|_| Ok(r#"{"build_tools": ["wheel==0.42.0"]}"#.to_string()));

        let plan = Plan::discover(&runtime, None).unwrap();
        assert_eq!(plan.build_tools, vec![PackageSpec::new("wheel", "0.42.0")]);
    }

    #[test]
    fn test_discover_explicit_missing_file_fails() {
        let mut runtime = MockRuntime::new();
        configure_mock_runtime_basics(&mut runtime);
        runtime.expect_exists().returning(|_| false);

        let err = Plan::discover(&runtime, Some(Path::new("custom.json"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
