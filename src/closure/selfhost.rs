// src/closure/selfhost.rs

//! Self-host closure builder
//!
//! Alternates between two universes until nothing new turns up: every
//! binary in the closure contributes its source package, and every new
//! source package contributes the binaries its BuildRequires pull in.
//! Binaries and sources live in separate sets; finding one never marks
//! the other as found.

use super::{expand_requirements, ClosureResult, SequentialBuilder};
use crate::error::Result;
use crate::index::get_source_for_package;
use crate::packages::Package;
use crate::resolver::ResolutionContext;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct SelfHostBuilder<'a> {
    ctx: &'a ResolutionContext,
}

impl<'a> SelfHostBuilder<'a> {
    pub fn new(ctx: &'a ResolutionContext) -> Self {
        Self { ctx }
    }

    /// Self-host closure of `root` in a fresh result
    pub fn build(&self, root: Arc<Package>) -> Result<ClosureResult> {
        let mut result = ClosureResult::new();
        self.expand(root, &mut result)?;
        result.reconcile();
        Ok(result)
    }

    /// Add the self-host closure of binary `root` to `result`
    ///
    /// Ambiguities are not reconciled. On error `result` is left as it was,
    /// so a failed root cannot hide packages from the roots after it.
    pub fn expand(&self, root: Arc<Package>, result: &mut ClosureResult) -> Result<()> {
        self.ctx.check_index()?;

        let mut trial = result.clone();
        self.expand_into(root, &mut trial)?;
        *result = trial;
        Ok(())
    }

    fn expand_into(&self, root: Arc<Package>, result: &mut ClosureResult) -> Result<()> {
        let binaries = SequentialBuilder::new(self.ctx);
        let mut mark = result.binaries.mark();
        binaries.expand(root, result)?;

        loop {
            // Only binaries found since the last pass need their sources
            let discovered = result.binaries.added_since(mark);
            mark = result.binaries.mark();
            if discovered.is_empty() {
                break;
            }
            debug!("Self-host pass over {} new binaries", discovered.len());

            for binary in discovered {
                if let Some(source) = self.source_of(&binary)? {
                    self.expand_source(source, result, &binaries)?;
                }
            }
        }

        Ok(())
    }

    /// Source package of a binary, or `None` when it names none
    pub(crate) fn source_of(&self, binary: &Package) -> Result<Option<Arc<Package>>> {
        if binary.source_name.is_none() {
            warn!("{} has no source package, skipping its build requirements", binary);
            return Ok(None);
        }
        get_source_for_package(self.ctx.index(), binary).map(Some)
    }

    /// Resolve a new source package's BuildRequires into binaries
    fn expand_source(
        &self,
        source: Arc<Package>,
        result: &mut ClosureResult,
        binaries: &SequentialBuilder<'_>,
    ) -> Result<()> {
        if !result.sources.insert(Arc::clone(&source)) {
            return Ok(());
        }
        debug!("Expanding build requirements of {}", source);

        // BuildRequires have no Recommends
        let expansion = {
            let present = &result.binaries;
            expand_requirements(
                self.ctx,
                &source,
                source.requires.iter(),
                &|name: &str| present.contains_name(name),
            )?
        };

        for dep in result.absorb(expansion) {
            binaries.expand(dep, result)?;
        }
        Ok(())
    }
}
