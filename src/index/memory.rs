// src/index/memory.rs

//! In-memory package index

use super::{latest_per_name_arch, sort_packages, PackageIndex, Query};
use crate::error::Result;
use crate::packages::Package;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Package index held entirely in memory
///
/// Lookups by name and by provided capability go through hash maps; every
/// package implicitly provides its own name.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    packages: Vec<Arc<Package>>,
    by_name: HashMap<String, Vec<usize>>,
    by_provide: HashMap<String, Vec<usize>>,
}

impl MemoryIndex {
    /// Build an index over `packages`
    pub fn new(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut index = Self::default();
        for pkg in packages {
            index.insert(pkg);
        }
        debug!("Built in-memory index with {} packages", index.len());
        index
    }

    fn insert(&mut self, pkg: Package) {
        let slot = self.packages.len();

        self.by_name.entry(pkg.name.clone()).or_default().push(slot);

        let own_name = std::iter::once(&pkg.name);
        let mut seen = Vec::new();
        for capability in own_name.chain(pkg.provides.iter()) {
            if seen.contains(&capability) {
                continue;
            }
            seen.push(capability);
            self.by_provide
                .entry(capability.clone())
                .or_default()
                .push(slot);
        }

        self.packages.push(Arc::new(pkg));
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// All packages, in insertion order
    pub fn packages(&self) -> &[Arc<Package>] {
        &self.packages
    }
}

impl PackageIndex for MemoryIndex {
    fn filter(&self, query: &Query) -> Result<Vec<Arc<Package>>> {
        let slots: Box<dyn Iterator<Item = usize> + '_> = if let Some(capability) = &query.provides {
            Box::new(self.by_provide.get(capability).into_iter().flatten().copied())
        } else if let Some(name) = &query.name {
            Box::new(self.by_name.get(name).into_iter().flatten().copied())
        } else {
            Box::new(0..self.packages.len())
        };

        let mut matched: Vec<Arc<Package>> = slots
            .map(|slot| &self.packages[slot])
            .filter(|pkg| query.matches(pkg))
            .cloned()
            .collect();

        if query.latest_only {
            matched = latest_per_name_arch(matched);
        }
        sort_packages(&mut matched);

        Ok(matched)
    }
}
