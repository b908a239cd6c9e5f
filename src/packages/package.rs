// src/packages/package.rs

//! Package model shared by every index adapter and the closure engine

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Architecture string used by source packages
pub const SOURCE_ARCH: &str = "src";

/// A binary or source package as seen by the resolver
///
/// Requirement lists hold opaque capability strings. For source packages
/// `requires` carries the BuildRequires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub requires_pre: Vec<String>,
    #[serde(default)]
    pub recommends: Vec<String>,
    /// Name of the source package this binary was built from
    #[serde(default)]
    pub source_name: Option<String>,
}

impl Package {
    /// Create a package with no relations
    pub fn new(name: &str, version: &str, release: &str, arch: &str) -> Self {
        Self {
            name: name.to_string(),
            epoch: 0,
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
            provides: Vec::new(),
            requires: Vec::new(),
            requires_pre: Vec::new(),
            recommends: Vec::new(),
            source_name: None,
        }
    }

    pub fn with_epoch(mut self, epoch: u32) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_provides<I, S>(mut self, provides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(provides.into_iter().map(Into::into));
        self
    }

    pub fn with_requires<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(requires.into_iter().map(Into::into));
        self
    }

    pub fn with_requires_pre<I, S>(mut self, requires: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires_pre.extend(requires.into_iter().map(Into::into));
        self
    }

    pub fn with_recommends<I, S>(mut self, recommends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommends.extend(recommends.into_iter().map(Into::into));
        self
    }

    pub fn with_source(mut self, source_name: &str) -> Self {
        self.source_name = Some(source_name.to_string());
        self
    }

    /// Whether this is a source package
    pub fn is_source(&self) -> bool {
        self.arch == SOURCE_ARCH
    }

    /// Whether the package offers `capability`, its own name included
    pub fn provides_capability(&self, capability: &str) -> bool {
        self.name == capability || self.provides.iter().any(|p| p == capability)
    }

    /// Epoch, version and release for ordering
    pub fn evr(&self) -> (u32, &str, &str) {
        (self.epoch, &self.version, &self.release)
    }

    /// Full `epoch:name-version-release.arch` form
    pub fn nevra(&self) -> String {
        format!(
            "{}:{}-{}-{}.{}",
            self.epoch, self.name, self.version, self.release, self.arch
        )
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}",
            self.name, self.version, self.release, self.arch
        )
    }
}

/// Deduplication key of a package inside one dependency set
///
/// Binary sets key by name and architecture; source sets key by name
/// alone. Ordering is by name, then architecture, which matches the
/// lexical order of the `name#arch` rendering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepKey {
    pub name: String,
    pub arch: Option<String>,
}

impl DepKey {
    /// Key including the architecture
    pub fn binary(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            arch: Some(pkg.arch.clone()),
        }
    }

    /// Key on the name alone
    pub fn source(pkg: &Package) -> Self {
        Self {
            name: pkg.name.clone(),
            arch: None,
        }
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arch {
            Some(arch) => write!(f, "{}#{}", self.name, arch),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Components of an RPM file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmFilename {
    pub name: String,
    pub version: String,
    pub release: String,
    pub epoch: Option<String>,
    pub arch: String,
}

/// Split `[epoch:]name-version-release.arch[.rpm]`
///
/// Used to recover the source package name from a binary's SOURCERPM
/// field, e.g. `bash-4.3.43-4.fc25.src.rpm`.
pub fn split_rpm_filename(filename: &str) -> Result<RpmFilename> {
    let malformed = || Error::ParseError(format!("Malformed RPM file name: {}", filename));

    let base = filename.strip_suffix(".rpm").unwrap_or(filename);

    let arch_index = base.rfind('.').ok_or_else(malformed)?;
    let arch = &base[arch_index + 1..];

    let rel_index = base[..arch_index].rfind('-').ok_or_else(malformed)?;
    let release = &base[rel_index + 1..arch_index];

    let ver_index = base[..rel_index].rfind('-').ok_or_else(malformed)?;
    let version = &base[ver_index + 1..rel_index];

    let (epoch, name_start) = match base[..ver_index].find(':') {
        Some(idx) => (Some(base[..idx].to_string()), idx + 1),
        None => (None, 0),
    };
    let name = &base[name_start..ver_index];

    if name.is_empty() || version.is_empty() || release.is_empty() || arch.is_empty() {
        return Err(malformed());
    }

    Ok(RpmFilename {
        name: name.to_string(),
        version: version.to_string(),
        release: release.to_string(),
        epoch,
        arch: arch.to_string(),
    })
}

/// Split a user-supplied `name#arch` into its parts
pub fn split_pkgname(spec: &str) -> (&str, Option<&str>) {
    match spec.rsplit_once('#') {
        Some((name, arch)) if !arch.is_empty() => (name, Some(arch)),
        Some((name, _)) => (name, None),
        None => (spec, None),
    }
}
