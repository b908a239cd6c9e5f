// src/index/mod.rs

//! Package index boundary
//!
//! The closure engine never reads repodata itself. It asks a
//! [`PackageIndex`] which packages match a name, a provided capability
//! and an architecture. This module defines that contract plus the
//! exactly-one identity lookups built on it:
//! - `memory`: an in-memory index over parsed repodata or RPM headers
//! - `sqlite`: an index stored in a SQLite database by `whatpkgs import`

pub mod memory;
pub mod sqlite;

pub use memory::MemoryIndex;
pub use sqlite::SqliteIndex;

use crate::config::ArchPolicy;
use crate::error::{Error, Result};
use crate::packages::{Package, SOURCE_ARCH};
use crate::version::compare_evr;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Read-only package query engine
///
/// Implementations are shared by every closure worker, so they must be
/// `Send + Sync` and must not change between queries of one run.
pub trait PackageIndex: Send + Sync {
    /// Return every package matching all of the query's set filters
    ///
    /// Results are sorted by name, architecture and EVR so that callers
    /// enumerating candidates see the same order on every run.
    fn filter(&self, query: &Query) -> Result<Vec<Arc<Package>>>;

    /// Whether pre-install requirements are tracked separately
    fn supports_requires_pre(&self) -> bool {
        true
    }
}

/// Filter accepted by [`PackageIndex::filter`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub name: Option<String>,
    pub provides: Option<String>,
    pub arch: Option<String>,
    /// Collapse multiple versions of one name and arch to the newest
    pub latest_only: bool,
}

impl Query {
    /// Match packages by exact name
    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Match packages offering a capability
    pub fn providing(capability: &str) -> Self {
        Self {
            provides: Some(capability.to_string()),
            ..Self::default()
        }
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.arch = Some(arch.to_string());
        self
    }

    pub fn latest(mut self) -> Self {
        self.latest_only = true;
        self
    }

    /// Whether `pkg` passes the name, provides and arch filters
    pub fn matches(&self, pkg: &Package) -> bool {
        self.name.as_ref().is_none_or(|name| &pkg.name == name)
            && self.arch.as_ref().is_none_or(|arch| &pkg.arch == arch)
            && self
                .provides
                .as_ref()
                .is_none_or(|capability| pkg.provides_capability(capability))
    }
}

/// Keep only the newest packages per name and architecture
///
/// Packages tied at the highest EVR are all kept, so identity lookups
/// can tell a duplicated build apart from a unique one.
pub fn latest_per_name_arch(packages: Vec<Arc<Package>>) -> Vec<Arc<Package>> {
    let mut newest: HashMap<(String, String), Vec<Arc<Package>>> = HashMap::new();

    for pkg in packages {
        let key = (pkg.name.clone(), pkg.arch.clone());
        let kept = newest.entry(key).or_default();
        match kept.first().map(|current| compare_evr(current.evr(), pkg.evr())) {
            Some(Ordering::Greater) => {}
            Some(Ordering::Equal) => kept.push(pkg),
            Some(Ordering::Less) | None => *kept = vec![pkg],
        }
    }

    newest.into_values().flatten().collect()
}

/// Deterministic candidate order: name, architecture, then EVR
pub fn sort_packages(packages: &mut [Arc<Package>]) {
    packages.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.arch.cmp(&b.arch))
            .then_with(|| compare_evr(a.evr(), b.evr()))
    });
}

/// Expect exactly one match for an identity lookup
fn exactly_one(mut matched: Vec<Arc<Package>>, what: &str) -> Result<Option<Arc<Package>>> {
    match matched.len() {
        0 => Ok(None),
        1 => Ok(matched.pop()),
        _ => Err(Error::TooManyPackages(what.to_string())),
    }
}

/// Look up a package by exact name
///
/// With an explicit `arch` only that architecture is considered.
/// Otherwise the policy's fallback order is tried (primary, secondary,
/// noarch by default) and the first architecture with a match wins.
pub fn get_pkg_by_name(
    index: &dyn PackageIndex,
    policy: &ArchPolicy,
    name: &str,
    arch: Option<&str>,
) -> Result<Arc<Package>> {
    let arches = match arch {
        Some(arch) => vec![arch],
        None => policy.fallback_arches(),
    };

    for arch in arches {
        let matched = index.filter(&Query::by_name(name).arch(arch).latest())?;
        if let Some(pkg) = exactly_one(matched, name)? {
            debug!("Resolved root {} to {}", name, pkg);
            return Ok(pkg);
        }
    }

    Err(Error::NoSuchPackage(name.to_string()))
}

/// Look up the source package a binary was built from
pub fn get_source_for_package(index: &dyn PackageIndex, pkg: &Package) -> Result<Arc<Package>> {
    let source_name = pkg
        .source_name
        .as_deref()
        .ok_or_else(|| Error::NoSuchPackage(format!("source of {}", pkg.name)))?;

    let matched = index.filter(&Query::by_name(source_name).arch(SOURCE_ARCH).latest())?;
    exactly_one(matched, &pkg.name)?.ok_or_else(|| Error::NoSuchPackage(pkg.name.clone()))
}
