// src/report.rs

//! Plain-text rendering of closure results
//!
//! Lines are produced in key order, never in discovery order, so two runs
//! over the same index print the same report.

use crate::closure::{AmbiguityList, DependencySet};
use crate::config::ArchPolicy;
use crate::packages::Package;

/// Header printed before the ambiguity block
pub const UNRESOLVED_HEADER: &str = "=== Unresolved Requirements ===";

/// How package lines are spelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportStyle {
    /// Print `epoch:name-version-release.arch` instead of the short name
    pub full_names: bool,
}

/// One package line
///
/// Short names carry `#arch` only for the secondary architecture, so a
/// 32-bit companion stays distinguishable from its primary twin.
pub fn package_line(pkg: &Package, policy: &ArchPolicy, style: ReportStyle) -> String {
    if style.full_names {
        pkg.nevra()
    } else if policy.is_secondary(&pkg.arch) {
        format!("{}#{}", pkg.name, pkg.arch)
    } else {
        pkg.name.clone()
    }
}

/// Lines for every package in `set`, leaving out the entry of `skip`
///
/// `skip` is matched by the set's own key, so skipping a binary root keeps
/// its other architectures, while in a source set it drops the root's
/// source package.
pub fn set_lines(
    set: &DependencySet,
    policy: &ArchPolicy,
    style: ReportStyle,
    skip: Option<&Package>,
) -> Vec<String> {
    let skip = skip.map(|pkg| set.key_for(pkg));
    set.iter()
        .filter(|(key, _)| skip.as_ref() != Some(*key))
        .map(|(_, pkg)| package_line(pkg, policy, style))
        .collect()
}

/// Lines for the trailing ambiguity block; empty when nothing is left
pub fn ambiguity_lines(ambiguities: &AmbiguityList, style: ReportStyle) -> Vec<String> {
    if ambiguities.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![UNRESOLVED_HEADER.to_string()];
    for record in ambiguities.sorted() {
        let requirements: Vec<&str> = record.requirements.iter().map(String::as_str).collect();
        let required_by: Vec<&str> = record.required_by.iter().map(String::as_str).collect();
        lines.push(format!(
            "[{}] required by {}",
            requirements.join(", "),
            required_by.join(", ")
        ));
        for (key, pkg) in &record.candidates {
            if style.full_names {
                lines.push(format!("    {}", pkg.nevra()));
            } else {
                lines.push(format!("    {}", key));
            }
        }
    }
    lines
}

/// Header line for one root in per-root self-host reports
pub fn root_header(root: &Package) -> String {
    format!("=== {}.{} ===", root.name, root.arch)
}
