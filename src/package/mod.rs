//! Package model
//!
//! Exact package pins and the requirements manifest they take precedence over.

mod manifest;
mod spec;

pub use manifest::{Manifest, ManifestLine, PinOverride, Requirement};
pub use spec::{PackageSpec, is_valid_name, normalize_name};
