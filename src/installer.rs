//! Builds `python -m pip` invocations.

use std::path::Path;

use crate::package::PackageSpec;
use crate::runtime::Invocation;

#[cfg(windows)]
pub const DEFAULT_PYTHON: &str = "python";
#[cfg(not(windows))]
pub const DEFAULT_PYTHON: &str = "python3";

/// The package installer as driven through a Python interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installer {
    python: String,
    extra_args: Vec<String>,
    quiet: bool,
}

impl Default for Installer {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON)
    }
}

impl Installer {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            extra_args: Vec::new(),
            quiet: false,
        }
    }

    /// Arguments appended to every install invocation.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn pip(&self) -> Invocation {
        Invocation::new(&self.python).args(["-m", "pip"])
    }

    fn install(&self) -> Invocation {
        let inv = self.pip().arg("install");
        if self.quiet { inv.arg("-q") } else { inv }
    }

    /// `pip install --upgrade <package>`, unpinned.
    pub fn upgrade(&self, package: &str) -> Invocation {
        self.install()
            .arg("--upgrade")
            .arg(package)
            .args(self.extra_args.iter().cloned())
    }

    /// `pip install name==version ...`, in the given order.
    pub fn install_pins(&self, pins: &[PackageSpec]) -> Invocation {
        self.install()
            .args(pins.iter().map(|p| p.to_string()))
            .args(self.extra_args.iter().cloned())
    }

    /// `pip install -r <manifest> -c <constraints>`.
    pub fn install_manifest(&self, manifest: &Path, constraints: &Path) -> Invocation {
        self.install()
            .arg("-r")
            .arg(manifest.to_string_lossy())
            .arg("-c")
            .arg(constraints.to_string_lossy())
            .args(self.extra_args.iter().cloned())
    }

    /// `pip list --format=json`.
    pub fn list_installed(&self) -> Invocation {
        self.pip().args(["list", "--format=json", "--disable-pip-version-check"])
    }
}
