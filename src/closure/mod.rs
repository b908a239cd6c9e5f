// src/closure/mod.rs

//! Dependency closure building
//!
//! This module provides:
//! - `DependencySet`: the deduplicated set of packages of one closure
//! - `AmbiguityRecord` / `AmbiguityList`: requirements left with several providers
//! - `ClosureResult`: everything a build produces, diagnostics included
//! - Builders: `sequential`, `selfhost` and `parallel`, plus `reconcile`
//!
//! All builders share [`expand_requirements`], so a package's
//! requirements resolve the same way whichever builder visits it.

pub mod parallel;
pub mod reconcile;
pub mod selfhost;
pub mod sequential;

pub use parallel::ParallelBuilder;
pub use reconcile::reconcile;
pub use selfhost::SelfHostBuilder;
pub use sequential::SequentialBuilder;

use crate::error::Result;
use crate::packages::{DepKey, Package};
use crate::resolver::{ResolutionContext, ResolutionOutcome};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a dependency set derives its keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// `name#arch`
    Binary,
    /// `name` alone
    Source,
}

/// Deduplicated packages of one closure, ordered by key
///
/// Membership only grows. Insertions are journaled so a caller can ask
/// what was added since an earlier point.
#[derive(Debug, Clone)]
pub struct DependencySet {
    mode: KeyMode,
    packages: BTreeMap<DepKey, Arc<Package>>,
    journal: Vec<DepKey>,
}

impl DependencySet {
    pub fn new(mode: KeyMode) -> Self {
        Self {
            mode,
            packages: BTreeMap::new(),
            journal: Vec::new(),
        }
    }

    pub fn binary() -> Self {
        Self::new(KeyMode::Binary)
    }

    pub fn source() -> Self {
        Self::new(KeyMode::Source)
    }

    pub fn key_for(&self, pkg: &Package) -> DepKey {
        match self.mode {
            KeyMode::Binary => DepKey::binary(pkg),
            KeyMode::Source => DepKey::source(pkg),
        }
    }

    /// Insert unless the key is taken; returns whether it was added
    pub fn insert(&mut self, pkg: Arc<Package>) -> bool {
        let key = self.key_for(&pkg);
        if self.packages.contains_key(&key) {
            return false;
        }
        self.journal.push(key.clone());
        self.packages.insert(key, pkg);
        true
    }

    pub fn contains(&self, pkg: &Package) -> bool {
        self.packages.contains_key(&self.key_for(pkg))
    }

    pub fn contains_key(&self, key: &DepKey) -> bool {
        self.packages.contains_key(key)
    }

    /// Whether any package of this name is present, whatever its arch
    pub fn contains_name(&self, name: &str) -> bool {
        let start = DepKey {
            name: name.to_string(),
            arch: None,
        };
        self.packages
            .range(start..)
            .next()
            .is_some_and(|(key, _)| key.name == name)
    }

    pub fn get(&self, key: &DepKey) -> Option<&Arc<Package>> {
        self.packages.get(key)
    }

    /// Position in the insertion journal
    pub fn mark(&self) -> usize {
        self.journal.len()
    }

    /// Packages inserted after `mark`, in insertion order
    pub fn added_since(&self, mark: usize) -> Vec<Arc<Package>> {
        self.journal[mark.min(self.journal.len())..]
            .iter()
            .filter_map(|key| self.packages.get(key).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Entries sorted by key
    pub fn iter(&self) -> impl Iterator<Item = (&DepKey, &Arc<Package>)> {
        self.packages.iter()
    }

    pub fn keys(&self) -> BTreeSet<DepKey> {
        self.packages.keys().cloned().collect()
    }
}

/// One requirement that several packages could satisfy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguityRecord {
    /// Requirement strings that produced this candidate set
    pub requirements: BTreeSet<String>,
    /// Packages that carried those requirements
    pub required_by: BTreeSet<String>,
    pub candidates: BTreeMap<DepKey, Arc<Package>>,
}

impl AmbiguityRecord {
    pub fn new(requirement: &str, parent: &Package, candidates: &[Arc<Package>]) -> Self {
        Self {
            requirements: BTreeSet::from([requirement.to_string()]),
            required_by: BTreeSet::from([parent.to_string()]),
            candidates: candidates
                .iter()
                .map(|pkg| (DepKey::binary(pkg), Arc::clone(pkg)))
                .collect(),
        }
    }

    fn same_candidates(&self, other: &AmbiguityRecord) -> bool {
        self.candidates.keys().eq(other.candidates.keys())
    }

    /// Whether another edge of the closure already pinned a candidate
    pub fn is_resolved_by(&self, binaries: &DependencySet) -> bool {
        self.candidates.keys().any(|key| binaries.contains_key(key))
    }
}

/// Ambiguity records, one per distinct candidate set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbiguityList {
    records: Vec<AmbiguityRecord>,
}

impl AmbiguityList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, merging it into an existing one with the same candidates
    pub fn push(&mut self, record: AmbiguityRecord) {
        match self.records.iter_mut().find(|r| r.same_candidates(&record)) {
            Some(existing) => {
                existing.requirements.extend(record.requirements);
                existing.required_by.extend(record.required_by);
            }
            None => self.records.push(record),
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&AmbiguityRecord) -> bool) {
        self.records.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AmbiguityRecord> {
        self.records.iter()
    }

    /// Records ordered by their candidate keys
    pub fn sorted(&self) -> Vec<&AmbiguityRecord> {
        let mut records: Vec<_> = self.records.iter().collect();
        records.sort_by(|a, b| a.candidates.keys().cmp(b.candidates.keys()));
        records
    }
}

impl FromIterator<AmbiguityRecord> for AmbiguityList {
    fn from_iter<I: IntoIterator<Item = AmbiguityRecord>>(iter: I) -> Self {
        let mut list = Self::new();
        for record in iter {
            list.push(record);
        }
        list
    }
}

/// Non-fatal findings gathered while building a closure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureDiagnostics {
    /// (requirement, requiring package) pairs with no provider
    pub unresolved: BTreeSet<(String, String)>,
    /// Package names that were skipped because they are filtered
    pub filtered: BTreeSet<String>,
    /// (package name, requiring package) pairs for `whatreqs` names
    pub provenance: BTreeSet<(String, String)>,
}

impl ClosureDiagnostics {
    pub fn merge(&mut self, other: ClosureDiagnostics) {
        self.unresolved.extend(other.unresolved);
        self.filtered.extend(other.filtered);
        self.provenance.extend(other.provenance);
    }
}

/// Output of a closure build
#[derive(Debug, Clone)]
pub struct ClosureResult {
    pub binaries: DependencySet,
    /// Source packages; only self-host builds fill this
    pub sources: DependencySet,
    pub ambiguities: AmbiguityList,
    pub diagnostics: ClosureDiagnostics,
}

impl ClosureResult {
    pub fn new() -> Self {
        Self {
            binaries: DependencySet::binary(),
            sources: DependencySet::source(),
            ambiguities: AmbiguityList::new(),
            diagnostics: ClosureDiagnostics::default(),
        }
    }

    /// Take in one package's expansion and return the packages to visit next
    pub(crate) fn absorb(&mut self, expansion: Expansion) -> Vec<Arc<Package>> {
        for record in expansion.ambiguities {
            self.ambiguities.push(record);
        }
        self.diagnostics.merge(expansion.diagnostics);
        expansion.deps
    }

    /// Drop ambiguity records that the binary set already settles
    pub fn reconcile(&mut self) {
        let ambiguities = std::mem::take(&mut self.ambiguities);
        self.ambiguities = reconcile(&self.binaries, ambiguities);
    }
}

impl Default for ClosureResult {
    fn default() -> Self {
        Self::new()
    }
}

/// What resolving one package's requirements produced
#[derive(Debug, Default)]
pub(crate) struct Expansion {
    pub deps: Vec<Arc<Package>>,
    pub ambiguities: Vec<AmbiguityRecord>,
    pub diagnostics: ClosureDiagnostics,
}

/// Requires, then Requires(pre), then Recommends when followed
pub(crate) fn requirements_of(
    pkg: &Package,
    follow_recommends: bool,
) -> impl Iterator<Item = &String> {
    let recommends: &[String] = if follow_recommends {
        &pkg.recommends
    } else {
        &[]
    };
    pkg.requires
        .iter()
        .chain(pkg.requires_pre.iter())
        .chain(recommends.iter())
}

/// Resolve every requirement of `parent`
///
/// `present` is handed to the resolver for pick-first.
pub(crate) fn expand_requirements<'a>(
    ctx: &ResolutionContext,
    parent: &Package,
    requirements: impl IntoIterator<Item = &'a String>,
    present: &dyn Fn(&str) -> bool,
) -> Result<Expansion> {
    let mut expansion = Expansion::default();

    for requirement in requirements {
        match ctx.resolve(requirement, present)? {
            ResolutionOutcome::Single(dep) => {
                note_provenance(ctx, &dep, parent, &mut expansion.diagnostics);
                expansion.deps.push(dep);
            }
            ResolutionOutcome::Filtered(dep) => {
                note_provenance(ctx, &dep, parent, &mut expansion.diagnostics);
                expansion.diagnostics.filtered.insert(dep.name.clone());
            }
            ResolutionOutcome::NotFound => {
                warn!("No package for [{}] required by [{}]", requirement, parent);
                expansion
                    .diagnostics
                    .unresolved
                    .insert((requirement.clone(), parent.to_string()));
            }
            ResolutionOutcome::Ambiguous(candidates) => {
                debug!(
                    "{} candidates for [{}] required by [{}]",
                    candidates.len(),
                    requirement,
                    parent
                );
                expansion
                    .ambiguities
                    .push(AmbiguityRecord::new(requirement, parent, &candidates));
            }
        }
    }

    Ok(expansion)
}

fn note_provenance(
    ctx: &ResolutionContext,
    dep: &Package,
    parent: &Package,
    diagnostics: &mut ClosureDiagnostics,
) {
    if ctx.settings.whatreqs.contains(&dep.name) {
        info!("{} is pulled in by {}", dep.name, parent.name);
        diagnostics
            .provenance
            .insert((dep.name.clone(), parent.name.clone()));
    }
}
