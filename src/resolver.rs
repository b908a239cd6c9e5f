// src/resolver.rs

//! Requirement resolution
//!
//! Turns one symbolic requirement into the package that satisfies it:
//! - Providers are looked up per architecture, in the policy's fallback
//!   order, keeping only the latest version of each package
//! - Several providers are narrowed down by hints, then by pick-first
//! - The selected package is dropped if its name is filtered
//!
//! Nothing here is an error unless the index itself fails. Missing,
//! filtered and ambiguous providers are ordinary [`ResolutionOutcome`]s.

use crate::config::{ArchPolicy, ResolutionSettings};
use crate::error::{Error, Result};
use crate::index::{PackageIndex, Query};
use crate::packages::Package;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Result of resolving one requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Exactly one package was selected
    Single(Arc<Package>),
    /// Nothing provides the requirement
    NotFound,
    /// The selected package is on the skip list
    Filtered(Arc<Package>),
    /// Several providers and no rule to pick one
    Ambiguous(Vec<Arc<Package>>),
}

/// Number of threads serving time-bounded index queries
pub const QUERY_WORKERS: usize = 4;

type QueryReply = Result<Vec<Arc<Package>>>;

/// Fixed set of threads that run time-bounded queries
///
/// A query that outlives its timeout keeps its thread busy until the index
/// returns, so no more than [`QUERY_WORKERS`] abandoned queries ever run at
/// once. The threads exit when the pool is dropped.
struct QueryPool {
    jobs: Sender<(Query, Sender<QueryReply>)>,
}

impl QueryPool {
    fn start(index: &Arc<dyn PackageIndex>) -> Result<Self> {
        let (jobs, rx) = crossbeam_channel::bounded::<(Query, Sender<QueryReply>)>(QUERY_WORKERS);

        for id in 0..QUERY_WORKERS {
            let rx = rx.clone();
            let index = Arc::clone(index);
            std::thread::Builder::new()
                .name(format!("whatpkgs-query-{}", id))
                .spawn(move || {
                    for (query, reply) in rx {
                        let _ = reply.send(index.filter(&query));
                    }
                })?;
        }

        Ok(Self { jobs })
    }
}

/// Everything a closure build needs to resolve requirements
///
/// Cloning is cheap: the index and the query pool are shared, the settings
/// are small.
#[derive(Clone)]
pub struct ResolutionContext {
    index: Arc<dyn PackageIndex>,
    pub policy: ArchPolicy,
    pub settings: ResolutionSettings,
    queries: Arc<OnceLock<QueryPool>>,
}

impl ResolutionContext {
    pub fn new(index: Arc<dyn PackageIndex>, policy: ArchPolicy, settings: ResolutionSettings) -> Self {
        Self {
            index,
            policy,
            settings,
            queries: Arc::new(OnceLock::new()),
        }
    }

    pub fn index(&self) -> &dyn PackageIndex {
        self.index.as_ref()
    }

    /// Fail unless the index can answer everything a closure build asks
    pub fn check_index(&self) -> Result<()> {
        if !self.index.supports_requires_pre() {
            return Err(Error::IndexIncompatible(
                "index does not distinguish pre-install requirements; re-import it".to_string(),
            ));
        }
        Ok(())
    }

    /// Latest providers of `requirement` for the first architecture that has any
    pub fn providers(&self, requirement: &str) -> Result<Vec<Arc<Package>>> {
        for arch in self.policy.fallback_arches() {
            let query = Query::providing(requirement).arch(arch).latest();
            let matched = self.run_query(query)?;
            if !matched.is_empty() {
                return Ok(matched);
            }
        }
        Ok(Vec::new())
    }

    fn run_query(&self, query: Query) -> Result<Vec<Arc<Package>>> {
        match self.settings.query_timeout {
            None => self.index.filter(&query),
            Some(timeout) => self.run_query_bounded(query, timeout),
        }
    }

    fn query_pool(&self) -> Result<&QueryPool> {
        if let Some(pool) = self.queries.get() {
            return Ok(pool);
        }
        let pool = QueryPool::start(&self.index)?;
        Ok(self.queries.get_or_init(|| pool))
    }

    /// Run a query on the query pool and give up after `timeout`
    ///
    /// A query that times out, or finds every pool thread still busy, is
    /// treated as matching nothing.
    fn run_query_bounded(&self, query: Query, timeout: Duration) -> Result<Vec<Arc<Package>>> {
        let deadline = Instant::now() + timeout;
        let label = query
            .provides
            .clone()
            .or_else(|| query.name.clone())
            .unwrap_or_default();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);

        if self
            .query_pool()?
            .jobs
            .send_deadline((query, reply_tx), deadline)
            .is_err()
        {
            warn!(
                "No query worker free for {} within {:?}, treating it as no provider",
                label, timeout
            );
            return Ok(Vec::new());
        }

        match reply_rx.recv_deadline(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Query for {} timed out after {:?}, treating it as no provider",
                    label, timeout
                );
                Ok(Vec::new())
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Query worker exited without answering for {}", label);
                Ok(Vec::new())
            }
        }
    }

    /// Resolve one requirement
    ///
    /// `present` tells pick-first whether a package name is already part
    /// of the closure being built.
    pub fn resolve(
        &self,
        requirement: &str,
        present: &dyn Fn(&str) -> bool,
    ) -> Result<ResolutionOutcome> {
        let mut candidates = self.providers(requirement)?;
        // Identical builds from several repositories are one provider
        candidates.dedup_by(|a, b| a.name == b.name && a.arch == b.arch);

        let selected = match candidates.len() {
            0 => return Ok(ResolutionOutcome::NotFound),
            1 => Arc::clone(&candidates[0]),
            _ => match self.disambiguate(&candidates, present) {
                Some(selected) => {
                    debug!("Disambiguated {} to {}", requirement, selected);
                    selected
                }
                None => return Ok(ResolutionOutcome::Ambiguous(candidates)),
            },
        };

        if self.settings.is_filtered(&selected.name) {
            debug!("Skipping filtered package {} for {}", selected.name, requirement);
            return Ok(ResolutionOutcome::Filtered(selected));
        }

        Ok(ResolutionOutcome::Single(selected))
    }

    fn disambiguate(
        &self,
        candidates: &[Arc<Package>],
        present: &dyn Fn(&str) -> bool,
    ) -> Option<Arc<Package>> {
        // The first hint naming any candidate wins, not the best match
        for hint in &self.settings.hints {
            if let Some(pkg) = candidates.iter().find(|pkg| &pkg.name == hint) {
                return Some(Arc::clone(pkg));
            }
        }

        if !self.settings.pick_first {
            return None;
        }

        if let Some(pkg) = candidates.iter().find(|pkg| present(&pkg.name)) {
            return Some(Arc::clone(pkg));
        }

        for arch in self.policy.pick_first_arches() {
            if let Some(pkg) = candidates.iter().find(|pkg| pkg.arch == arch) {
                return Some(Arc::clone(pkg));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;

    fn nothing_present(_: &str) -> bool {
        false
    }

    fn context(packages: Vec<Package>, settings: ResolutionSettings) -> ResolutionContext {
        ResolutionContext::new(
            Arc::new(MemoryIndex::new(packages)),
            ArchPolicy::for_arch("x86_64"),
            settings,
        )
    }

    fn libfoo_index() -> Vec<Package> {
        vec![
            Package::new("libfoo-v1", "1", "1", "x86_64").with_provides(["libfoo"]),
            Package::new("libfoo-v2", "2", "1", "x86_64").with_provides(["libfoo"]),
            Package::new("libbar", "1", "1", "i686").with_provides(["libbar"]),
            Package::new("tzdata", "2016", "1", "noarch"),
        ]
    }

    fn names(outcome: &ResolutionOutcome) -> Vec<String> {
        match outcome {
            ResolutionOutcome::Single(pkg) | ResolutionOutcome::Filtered(pkg) => {
                vec![pkg.name.clone()]
            }
            ResolutionOutcome::Ambiguous(candidates) => {
                candidates.iter().map(|p| p.name.clone()).collect()
            }
            ResolutionOutcome::NotFound => Vec::new(),
        }
    }

    #[test]
    fn test_arch_fallback() {
        let ctx = context(libfoo_index(), ResolutionSettings::runtime());

        let outcome = ctx.resolve("libbar", &nothing_present).unwrap();
        assert!(matches!(&outcome, ResolutionOutcome::Single(pkg) if pkg.arch == "i686"));

        let outcome = ctx.resolve("tzdata", &nothing_present).unwrap();
        assert!(matches!(&outcome, ResolutionOutcome::Single(pkg) if pkg.arch == "noarch"));
    }

    #[test]
    fn test_primary_arch_shadows_fallbacks() {
        let ctx = context(
            vec![
                Package::new("zlib", "1", "1", "x86_64"),
                Package::new("zlib", "1", "1", "i686"),
            ],
            ResolutionSettings::runtime(),
        );
        let outcome = ctx.resolve("zlib", &nothing_present).unwrap();
        assert!(matches!(&outcome, ResolutionOutcome::Single(pkg) if pkg.arch == "x86_64"));
    }

    #[test]
    fn test_not_found() {
        let ctx = context(libfoo_index(), ResolutionSettings::runtime());
        assert_eq!(
            ctx.resolve("libmissing", &nothing_present).unwrap(),
            ResolutionOutcome::NotFound
        );
    }

    #[test]
    fn test_ambiguous_without_policy() {
        let ctx = context(libfoo_index(), ResolutionSettings::runtime());
        let outcome = ctx.resolve("libfoo", &nothing_present).unwrap();
        assert!(matches!(outcome, ResolutionOutcome::Ambiguous(_)));
        assert_eq!(names(&outcome), vec!["libfoo-v1", "libfoo-v2"]);
    }

    #[test]
    fn test_first_matching_hint_wins() {
        let mut settings = ResolutionSettings::runtime();
        settings.hints = vec![
            "unrelated".to_string(),
            "libfoo-v2".to_string(),
            "libfoo-v1".to_string(),
        ];
        let ctx = context(libfoo_index(), settings);

        let outcome = ctx.resolve("libfoo", &nothing_present).unwrap();
        assert_eq!(names(&outcome), vec!["libfoo-v2"]);
    }

    #[test]
    fn test_pick_first_prefers_present_name() {
        let mut settings = ResolutionSettings::runtime();
        settings.pick_first = true;
        let ctx = context(libfoo_index(), settings);

        let outcome = ctx.resolve("libfoo", &|name: &str| name == "libfoo-v2").unwrap();
        assert_eq!(names(&outcome), vec!["libfoo-v2"]);

        let outcome = ctx.resolve("libfoo", &nothing_present).unwrap();
        assert_eq!(names(&outcome), vec!["libfoo-v1"]);
    }

    #[test]
    fn test_pick_first_is_deterministic() {
        let mut settings = ResolutionSettings::runtime();
        settings.pick_first = true;
        let ctx = context(
            vec![
                Package::new("b-impl", "1", "1", "x86_64").with_provides(["cap"]),
                Package::new("a-impl", "1", "1", "x86_64").with_provides(["cap"]),
            ],
            settings,
        );

        let first = ctx.resolve("cap", &nothing_present).unwrap();
        for _ in 0..5 {
            assert_eq!(ctx.resolve("cap", &nothing_present).unwrap(), first);
        }
        assert_eq!(names(&first), vec!["a-impl"]);
    }

    #[test]
    fn test_filter_applies_to_sole_and_selected_candidates() {
        let mut settings = ResolutionSettings::runtime();
        settings.filters.insert("libbar".to_string());
        settings.filters.insert("libfoo-v2".to_string());
        settings.hints = vec!["libfoo-v2".to_string()];
        let ctx = context(libfoo_index(), settings);

        assert!(matches!(
            ctx.resolve("libbar", &nothing_present).unwrap(),
            ResolutionOutcome::Filtered(_)
        ));
        assert!(matches!(
            ctx.resolve("libfoo", &nothing_present).unwrap(),
            ResolutionOutcome::Filtered(_)
        ));
    }

    #[test]
    fn test_check_index() {
        struct LegacyIndex;
        impl PackageIndex for LegacyIndex {
            fn filter(&self, _query: &Query) -> Result<Vec<Arc<Package>>> {
                Ok(Vec::new())
            }
            fn supports_requires_pre(&self) -> bool {
                false
            }
        }

        let ctx = ResolutionContext::new(
            Arc::new(LegacyIndex),
            ArchPolicy::for_arch("x86_64"),
            ResolutionSettings::runtime(),
        );
        assert!(matches!(ctx.check_index(), Err(Error::IndexIncompatible(_))));

        let ctx = context(Vec::new(), ResolutionSettings::runtime());
        assert!(ctx.check_index().is_ok());
    }

    #[test]
    fn test_query_timeout_means_no_provider() {
        struct SlowIndex;
        impl PackageIndex for SlowIndex {
            fn filter(&self, _query: &Query) -> Result<Vec<Arc<Package>>> {
                std::thread::sleep(Duration::from_millis(500));
                Ok(vec![Arc::new(Package::new("late", "1", "1", "x86_64"))])
            }
        }

        let mut settings = ResolutionSettings::runtime();
        settings.query_timeout = Some(Duration::from_millis(20));
        let ctx = ResolutionContext::new(
            Arc::new(SlowIndex),
            ArchPolicy::new("x86_64", None).with_fallback(vec![crate::config::ArchTier::Primary]),
            settings,
        );

        assert_eq!(
            ctx.resolve("anything", &nothing_present).unwrap(),
            ResolutionOutcome::NotFound
        );
    }

    #[test]
    fn test_timed_out_queries_occupy_bounded_workers() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct StuckIndex {
            active: AtomicUsize,
            peak: AtomicUsize,
        }
        impl PackageIndex for StuckIndex {
            fn filter(&self, _query: &Query) -> Result<Vec<Arc<Package>>> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }

        let index = Arc::new(StuckIndex::default());
        let mut settings = ResolutionSettings::runtime();
        settings.query_timeout = Some(Duration::from_millis(10));
        let ctx = ResolutionContext::new(
            Arc::clone(&index) as Arc<dyn PackageIndex>,
            ArchPolicy::new("x86_64", None).with_fallback(vec![crate::config::ArchTier::Primary]),
            settings,
        );

        for i in 0..QUERY_WORKERS * 4 {
            assert_eq!(
                ctx.resolve(&format!("cap{}", i), &nothing_present).unwrap(),
                ResolutionOutcome::NotFound
            );
        }
        assert!(index.peak.load(Ordering::SeqCst) <= QUERY_WORKERS);
    }

    #[test]
    fn test_identical_builds_are_one_provider() {
        let ctx = context(
            vec![
                Package::new("zlib", "1.2", "1", "x86_64").with_provides(["libz.so.1"]),
                Package::new("zlib", "1.2", "1", "x86_64").with_provides(["libz.so.1"]),
            ],
            ResolutionSettings::runtime(),
        );
        assert!(matches!(
            ctx.resolve("libz.so.1", &nothing_present).unwrap(),
            ResolutionOutcome::Single(_)
        ));
    }

    #[test]
    fn test_query_within_timeout_is_answered() {
        let mut settings = ResolutionSettings::runtime();
        settings.query_timeout = Some(Duration::from_secs(5));
        let ctx = context(libfoo_index(), settings);

        assert!(matches!(
            ctx.resolve("libbar", &nothing_present).unwrap(),
            ResolutionOutcome::Single(_)
        ));
    }
}
