//! Checks that the environment reports every pin at exactly its version.

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::installer::Installer;
use crate::package::{PackageSpec, normalize_name};
use crate::runtime::Runtime;

/// One entry of `pip list --format=json`.
#[derive(Debug, Deserialize)]
struct InstalledPackage {
    name: String,
    version: String,
}

/// A pin the environment does not satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub pin: PackageSpec,
    /// Installed version, None when the package is absent
    pub installed: Option<String>,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.installed {
            Some(version) => write!(
                f,
                "{}: expected {}, found {}",
                self.pin.name, self.pin.version, version
            ),
            None => write!(f, "{}: expected {}, not installed", self.pin.name, self.pin.version),
        }
    }
}

#[derive(Debug, Default)]
pub struct VerifyReport {
    pub checked: Vec<PackageSpec>,
    pub mismatches: Vec<Mismatch>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Parse `pip list --format=json` output into normalized name -> version.
pub fn parse_installed(json: &str) -> Result<HashMap<String, String>> {
    let packages: Vec<InstalledPackage> =
        serde_json::from_str(json.trim()).context("Unexpected output from pip list")?;
    Ok(packages
        .into_iter()
        .map(|p| (normalize_name(&p.name), p.version))
        .collect())
}

/// Release segments compare numerically, so `1.5` and `1.5.0` are equal.
/// Anything after the release (pre/post/local tags) must match exactly.
pub fn same_version(a: &str, b: &str) -> bool {
    fn split(version: &str) -> (Vec<u64>, &str) {
        let version = version.trim();
        let end = version
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(version.len());
        let (release, rest) = version.split_at(end);
        let mut segments: Vec<u64> = release
            .split('.')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().unwrap_or(u64::MAX))
            .collect();
        while segments.last() == Some(&0) {
            segments.pop();
        }
        (segments, rest)
    }
    split(a) == split(b)
}

pub fn compare(pins: &[PackageSpec], installed: &HashMap<String, String>) -> VerifyReport {
    let mismatches = pins
        .iter()
        .filter_map(|pin| match installed.get(&pin.key()) {
            Some(version) if same_version(version, &pin.version) => None,
            other => Some(Mismatch {
                pin: pin.clone(),
                installed: other.cloned(),
            }),
        })
        .collect();

    VerifyReport {
        checked: pins.to_vec(),
        mismatches,
    }
}

/// Query the environment and compare it against `pins`.
#[tracing::instrument(skip(runtime, installer, pins))]
pub async fn verify_pins<R: Runtime>(
    runtime: &R,
    installer: &Installer,
    pins: &[PackageSpec],
) -> Result<VerifyReport> {
    let invocation = installer.list_installed();
    debug!("Listing installed packages: {}", invocation);

    let output = runtime.output(&invocation).await?;
    if !output.success() {
        bail!(
            "'{}' failed with exit code {}: {}",
            invocation,
            output.code,
            output.stderr.trim()
        );
    }

    let installed = parse_installed(&output.stdout)?;
    debug!("{} package(s) installed", installed.len());
    Ok(compare(pins, &installed))
}
