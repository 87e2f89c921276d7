//! Pinned package specification parsing.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An exact package pin.
/// Format: "name==version"
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Name in normalized form, used for comparisons.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Whether `name` refers to this package (case, `-`, `_`, `.` insensitive).
    pub fn matches(&self, name: &str) -> bool {
        self.key() == normalize_name(name)
    }
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

impl FromStr for PackageSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, version) = s.split_once("==").ok_or_else(|| {
            anyhow!(
                "Invalid package pin '{}': expected 'name==version'.",
                s
            )
        })?;

        let name = name.trim();
        let version = version.trim();

        if !is_valid_name(name) {
            return Err(anyhow!("Invalid package name '{}' in pin '{}'.", name, s));
        }
        if version.is_empty() {
            return Err(anyhow!(
                "Invalid package pin '{}': version after == cannot be empty.",
                s
            ));
        }
        if version
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '<' | '>' | '=' | '!' | '~' | ',' | ';' | '*'))
        {
            return Err(anyhow!(
                "Invalid package pin '{}': '{}' is not an exact version.",
                s,
                version
            ));
        }

        Ok(PackageSpec::new(name, version))
    }
}

impl TryFrom<String> for PackageSpec {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageSpec> for String {
    fn from(spec: PackageSpec) -> Self {
        spec.to_string()
    }
}

/// Normalize a distribution name: lowercase, runs of `-`, `_` and `.` become one `-`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
                in_separator = true;
            }
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// A distribution name starts and ends with an ASCII letter or digit and
/// otherwise contains only letters, digits, `-`, `_` and `.`.
pub fn is_valid_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        }
        _ => false,
    }
}
