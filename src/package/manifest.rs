//! Requirements manifest parsing and pin rewriting.
//!
//! A manifest is a pip requirements file. Only plain requirement lines
//! (`name[extras] specifier ; marker`) are interpreted; everything else
//! (options, includes, editable and URL installs) passes through untouched.
//! Per-requirement options such as `--hash` are kept apart from the specifier.

use anyhow::{Context, Result, anyhow};
use std::path::Path;

use super::spec::{PackageSpec, is_valid_name};
use crate::runtime::Runtime;

/// A plain requirement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    /// Version specifier text as written, e.g. `>=1.24,<2`. Empty when unconstrained.
    pub specifier: String,
    /// Environment marker after `;`, without the separator.
    pub marker: Option<String>,
    /// Trailing per-requirement options, e.g. `--hash=sha256:...`.
    pub options: Vec<String>,
}

impl Requirement {
    /// This requirement with its specifier replaced by the pin's exact version.
    /// Extras, marker and options are kept, except hashes of a different version.
    pub fn pinned_to(&self, pin: &PackageSpec) -> String {
        let mut out = self.name.clone();
        if !self.extras.is_empty() {
            out.push('[');
            out.push_str(&self.extras.join(","));
            out.push(']');
        }
        out.push_str("==");
        out.push_str(&pin.version);
        if let Some(marker) = &self.marker {
            out.push_str(" ; ");
            out.push_str(marker);
        }
        let keep_hashes = self.is_exactly(&pin.version);
        let mut options = self.options.iter();
        while let Some(option) = options.next() {
            if !keep_hashes && is_hash_option(option) {
                if option == "--hash" {
                    options.next();
                }
                continue;
            }
            out.push(' ');
            out.push_str(option);
        }
        out
    }

    /// Whether the declared specifier already says exactly `==version`.
    pub fn is_exactly(&self, version: &str) -> bool {
        let spec: String = self.specifier.chars().filter(|c| !c.is_whitespace()).collect();
        spec == format!("=={}", version)
    }
}

impl std::str::FromStr for Requirement {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (s, options) = split_options(s);
        let (body, marker) = match s.split_once(';') {
            Some((body, marker)) => (body.trim(), Some(marker.trim().to_string())),
            None => (s.trim(), None),
        };

        let name_end = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
            .unwrap_or(body.len());
        let name = &body[..name_end];
        if !is_valid_name(name) {
            return Err(anyhow!("Invalid requirement '{}': bad package name.", s.trim()));
        }

        let mut rest = body[name_end..].trim_start();
        let mut extras = Vec::new();
        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| anyhow!("Invalid requirement '{}': unclosed '['.", s.trim()))?;
            extras = after[..close]
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
            rest = after[close + 1..].trim_start();
        }

        // Legacy parenthesized form: "numpy (>=1.20)"
        let specifier = rest
            .strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .unwrap_or(rest)
            .trim()
            .to_string();

        Ok(Requirement {
            name: name.to_string(),
            extras,
            specifier,
            marker: marker.filter(|m| !m.is_empty()),
            options,
        })
    }
}

/// Split `text` before its first whitespace-separated `--option` token.
fn split_options(text: &str) -> (&str, Vec<String>) {
    let mut start = None;
    let mut prev_space = true;
    for (i, c) in text.char_indices() {
        if prev_space && text[i..].starts_with("--") {
            start = Some(i);
            break;
        }
        prev_space = c.is_whitespace();
    }
    match start {
        Some(i) => (
            &text[..i],
            text[i..].split_whitespace().map(str::to_string).collect(),
        ),
        None => (text, Vec::new()),
    }
}

fn is_hash_option(option: &str) -> bool {
    option == "--hash" || option.starts_with("--hash=")
}

/// One logical manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLine {
    /// Blank line or comment.
    Comment(String),
    /// Option that installs nothing by itself (`--index-url`, `-c constraints.txt`, ...).
    Setting(String),
    /// Something pip installs that is not a plain requirement (`-r`, `-e`, URL, path).
    Reference(String),
    Requirement { raw: String, requirement: Requirement },
}

impl ManifestLine {
    pub fn raw(&self) -> &str {
        match self {
            ManifestLine::Comment(raw)
            | ManifestLine::Setting(raw)
            | ManifestLine::Reference(raw)
            | ManifestLine::Requirement { raw, .. } => raw,
        }
    }

    fn parse(line: &str) -> Result<Self> {
        let content = strip_comment(line).trim();

        if content.is_empty() {
            return Ok(ManifestLine::Comment(line.to_string()));
        }

        if content.starts_with('-') {
            return Ok(if is_installing_option(content) {
                ManifestLine::Reference(line.to_string())
            } else {
                ManifestLine::Setting(line.to_string())
            });
        }

        // PEP 508 direct reference ("name @ url") keeps its name
        let (body, options) = split_options(content);
        if let Some((left, right)) = body.split_once('@') {
            let left = left.trim();
            let bare_name = left.split('[').next().unwrap_or(left).trim();
            if is_valid_name(bare_name) && right.contains("://") {
                let (url, marker) = match right.split_once(" ;") {
                    Some((url, marker)) => (url.trim(), Some(marker.trim().to_string())),
                    None => (right.trim(), None),
                };
                let requirement = left.parse::<Requirement>()?;
                return Ok(ManifestLine::Requirement {
                    raw: line.to_string(),
                    requirement: Requirement {
                        specifier: format!("@ {}", url),
                        marker: marker.filter(|m| !m.is_empty()),
                        options,
                        ..requirement
                    },
                });
            }
        }

        if content.contains("://")
            || content.starts_with('.')
            || content.starts_with('/')
            || content.starts_with('\\')
            || content.ends_with(".whl")
            || content.ends_with(".tar.gz")
            || content.ends_with(".zip")
        {
            return Ok(ManifestLine::Reference(line.to_string()));
        }

        let requirement = content.parse::<Requirement>()?;
        Ok(ManifestLine::Requirement {
            raw: line.to_string(),
            requirement,
        })
    }
}

fn strip_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    // A '#' only starts a comment at the beginning or after whitespace
    let bytes = line.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && i > 0 && bytes[i - 1].is_ascii_whitespace() {
            return &line[..i];
        }
    }
    line
}

fn is_installing_option(content: &str) -> bool {
    const INSTALLING: [&str; 4] = ["-r", "--requirement", "-e", "--editable"];
    INSTALLING.iter().any(|opt| {
        content == *opt
            || content
                .strip_prefix(opt)
                .is_some_and(|rest| rest.starts_with([' ', '\t', '=']) || (opt.len() == 2 && !rest.starts_with('-')))
    })
}

/// A parsed requirements file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub lines: Vec<ManifestLine>,
}

/// A manifest requirement that was replaced by a pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinOverride {
    pub pin: PackageSpec,
    pub declared: Requirement,
}

impl PinOverride {
    /// True when the manifest asked for something other than the pin.
    pub fn conflicts(&self) -> bool {
        !self.declared.is_exactly(&self.pin.version)
    }
}

impl Manifest {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        content
            .parse()
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    pub fn requirements(&self) -> impl Iterator<Item = &Requirement> {
        self.lines.iter().filter_map(|line| match line {
            ManifestLine::Requirement { requirement, .. } => Some(requirement),
            _ => None,
        })
    }

    /// Whether installing this manifest would install anything.
    pub fn has_installables(&self) -> bool {
        self.lines.iter().any(|line| {
            matches!(
                line,
                ManifestLine::Requirement { .. } | ManifestLine::Reference(_)
            )
        })
    }

    /// Render the manifest with every requirement naming a pinned package
    /// replaced by that pin. Returns the new text and the replacements made.
    pub fn rewrite_with_pins(&self, pins: &[PackageSpec]) -> (String, Vec<PinOverride>) {
        let mut out = String::new();
        let mut overrides = Vec::new();

        for line in &self.lines {
            match line {
                ManifestLine::Requirement { requirement, .. } => {
                    if let Some(pin) = pins.iter().find(|p| p.matches(&requirement.name)) {
                        let pinned = PinOverride {
                            pin: pin.clone(),
                            declared: requirement.clone(),
                        };
                        if pinned.conflicts() {
                            out.push_str(&requirement.pinned_to(pin));
                        } else {
                            out.push_str(line.raw());
                        }
                        overrides.push(pinned);
                    } else {
                        out.push_str(line.raw());
                    }
                }
                other => out.push_str(other.raw()),
            }
            out.push('\n');
        }

        (out, overrides)
    }
}

impl std::str::FromStr for Manifest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut lines = Vec::new();
        let mut pending = String::new();

        for (index, physical) in s.lines().enumerate() {
            // A trailing backslash continues the line, unless it sits inside a comment
            if let Some(head) = strip_comment(physical).trim_end().strip_suffix('\\') {
                pending.push_str(head);
                continue;
            }
            let physical = if strip_comment(physical).len() < physical.len() {
                // Written back out, a commented backslash must not join lines
                physical.trim_end().trim_end_matches('\\').trim_end()
            } else {
                physical
            };
            pending.push_str(physical);
            let logical = std::mem::take(&mut pending);
            let line = ManifestLine::parse(&logical)
                .with_context(|| format!("line {}", index + 1))?;
            lines.push(line);
        }

        if !pending.is_empty() {
            lines.push(ManifestLine::parse(&pending)?);
        }

        Ok(Manifest { lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pins() -> Vec<PackageSpec> {
        vec![
            PackageSpec::new("numpy", "1.23.5"),
            PackageSpec::new("pandas", "1.5.3"),
        ]
    }

    #[test]
    fn test_parse_requirement_forms() {
        let r = Requirement::from_str("dash==2.14.1").unwrap();
        assert_eq!(r.name, "dash");
        assert_eq!(r.specifier, "==2.14.1");
        assert!(r.extras.is_empty());
        assert_eq!(r.marker, None);

        let r = Requirement::from_str("pandas[performance] >=1.5,<2 ; python_version < \"3.12\"").unwrap();
        assert_eq!(r.name, "pandas");
        assert_eq!(r.extras, vec!["performance"]);
        assert_eq!(r.specifier, ">=1.5,<2");
        assert_eq!(r.marker.as_deref(), Some("python_version < \"3.12\""));

        let r = Requirement::from_str("yfinance").unwrap();
        assert_eq!(r.specifier, "");

        let r = Requirement::from_str("numpy (>=1.20)").unwrap();
        assert_eq!(r.specifier, ">=1.20");
    }

    #[test]
    fn test_parse_requirement_errors() {
        assert!(Requirement::from_str(">=1.0").is_err());
        assert!(Requirement::from_str("pandas[perf >=1").is_err());
    }

    #[test]
    fn test_parse_manifest_classifies_lines() {
        let manifest = Manifest::from_str(
            "# app deps\n\
             \n\
             --index-url https://pypi.org/simple\n\
             -c constraints.txt\n\
             -r base.txt\n\
             -e ./vendor/ta\n\
             git+https://github.com/ranaroussi/yfinance.git\n\
             dash==2.14.1  # ui\n\
             ta\n",
        )
        .unwrap();

        assert!(matches!(manifest.lines[0], ManifestLine::Comment(_)));
        assert!(matches!(manifest.lines[1], ManifestLine::Comment(_)));
        assert!(matches!(manifest.lines[2], ManifestLine::Setting(_)));
        assert!(matches!(manifest.lines[3], ManifestLine::Setting(_)));
        assert!(matches!(manifest.lines[4], ManifestLine::Reference(_)));
        assert!(matches!(manifest.lines[5], ManifestLine::Reference(_)));
        assert!(matches!(manifest.lines[6], ManifestLine::Reference(_)));

        let names: Vec<_> = manifest.requirements().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["dash", "ta"]);
        assert_eq!(manifest.requirements().next().unwrap().specifier, "==2.14.1");
    }

    #[test]
    fn test_parse_manifest_joins_continuations() {
        let manifest = Manifest::from_str("plotly>=5.0,\\\n<6\n").unwrap();
        let reqs: Vec<_> = manifest.requirements().collect();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].specifier, ">=5.0,<6");
    }

    #[test]
    fn test_commented_backslash_does_not_continue() {
        let manifest =
            Manifest::from_str("# app deps \\\nrequests==2.31.0\ndash  # ui \\\nplotly\n").unwrap();

        let names: Vec<_> = manifest.requirements().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["requests", "dash", "plotly"]);

        let (text, _) = manifest.rewrite_with_pins(&pins());
        assert_eq!(text, "# app deps\nrequests==2.31.0\ndash  # ui\nplotly\n");
        let reparsed = Manifest::from_str(&text).unwrap();
        assert_eq!(reparsed.requirements().count(), 3);
    }

    #[test]
    fn test_continuation_ends_at_comment_line() {
        let manifest = Manifest::from_str("numpy>=1.20 \\\n# trailing note\nta\n").unwrap();
        let names: Vec<_> = manifest.requirements().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["numpy", "ta"]);
        assert_eq!(manifest.requirements().next().unwrap().specifier, ">=1.20");
    }

    #[test]
    fn test_parse_requirement_options() {
        let manifest = Manifest::from_str(
            "numpy==1.23.5 \\\n    --hash=sha256:aaaa \\\n    --hash=sha256:cccc\n\
             pandas>=1.5 ; python_version >= \"3.8\" --config-settings=editable_mode=compat\n",
        )
        .unwrap();
        let reqs: Vec<_> = manifest.requirements().collect();

        assert_eq!(reqs[0].specifier, "==1.23.5");
        assert_eq!(reqs[0].options, vec!["--hash=sha256:aaaa", "--hash=sha256:cccc"]);
        assert_eq!(reqs[1].specifier, ">=1.5");
        assert_eq!(reqs[1].marker.as_deref(), Some("python_version >= \"3.8\""));
        assert_eq!(reqs[1].options, vec!["--config-settings=editable_mode=compat"]);
    }

    #[test]
    fn test_rewrite_keeps_hashes_of_matching_pin() {
        let manifest = Manifest::from_str(
            "numpy==1.23.5 \\\n    --hash=sha256:aaaa\ndash==2.14.1 \\\n    --hash=sha256:bbbb\n",
        )
        .unwrap();

        let (text, overrides) = manifest.rewrite_with_pins(&pins());
        assert_eq!(overrides.len(), 1);
        assert!(!overrides[0].conflicts());
        assert_eq!(
            text,
            "numpy==1.23.5     --hash=sha256:aaaa\ndash==2.14.1     --hash=sha256:bbbb\n"
        );
    }

    #[test]
    fn test_rewrite_drops_hashes_of_other_version() {
        let manifest = Manifest::from_str(
            "pandas==2.0.3 --hash sha256:dddd --hash=sha256:eeee --config-settings=x=1\n",
        )
        .unwrap();

        let (text, overrides) = manifest.rewrite_with_pins(&pins());
        assert!(overrides[0].conflicts());
        assert_eq!(text, "pandas==1.5.3 --config-settings=x=1\n");
    }

    #[test]
    fn test_parse_manifest_reports_bad_line() {
        let err = Manifest::from_str("dash\n!!!\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_has_installables() {
        assert!(!Manifest::from_str("").unwrap().has_installables());
        assert!(
            !Manifest::from_str("# nothing\n--index-url https://pypi.org/simple\n")
                .unwrap()
                .has_installables()
        );
        assert!(Manifest::from_str("-r base.txt\n").unwrap().has_installables());
        assert!(Manifest::from_str("dash\n").unwrap().has_installables());
    }

    #[test]
    fn test_rewrite_replaces_pinned_packages() {
        let manifest = Manifest::from_str(
            "dash==2.14.1\n\
             numpy>=1.24\n\
             Pandas[performance]~=2.0 ; python_version >= \"3.8\"\n",
        )
        .unwrap();

        let (text, overrides) = manifest.rewrite_with_pins(&pins());
        assert_eq!(
            text,
            "dash==2.14.1\n\
             numpy==1.23.5\n\
             Pandas[performance]==1.5.3 ; python_version >= \"3.8\"\n"
        );
        assert_eq!(overrides.len(), 2);
        assert!(overrides.iter().all(|o| o.conflicts()));
        assert_eq!(overrides[0].declared.specifier, ">=1.24");
    }

    #[test]
    fn test_rewrite_matching_pin_is_not_a_conflict() {
        let manifest = Manifest::from_str("numpy == 1.23.5\n").unwrap();
        let (_, overrides) = manifest.rewrite_with_pins(&pins());
        assert_eq!(overrides.len(), 1);
        assert!(!overrides[0].conflicts());
    }

    #[test]
    fn test_rewrite_handles_direct_reference() {
        let manifest =
            Manifest::from_str("numpy @ https://example.com/numpy-1.26.0.tar.gz\n").unwrap();
        let (text, overrides) = manifest.rewrite_with_pins(&pins());
        assert_eq!(text, "numpy==1.23.5\n");
        assert!(overrides[0].conflicts());
    }

    #[test]
    fn test_rewrite_keeps_other_lines_verbatim() {
        let source = "# comment\n-r base.txt\nta==0.10.2\n";
        let manifest = Manifest::from_str(source).unwrap();
        let (text, overrides) = manifest.rewrite_with_pins(&pins());
        assert_eq!(text, source);
        assert!(overrides.is_empty());
    }
}
