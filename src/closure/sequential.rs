// src/closure/sequential.rs

//! Sequential closure builder
//!
//! Depth-first expansion driven by an explicit work stack, so deep
//! dependency chains cannot exhaust the call stack. A package is inserted
//! into the set before its requirements are resolved, which is what makes
//! cycles terminate.

use super::{expand_requirements, requirements_of, ClosureResult};
use crate::error::Result;
use crate::packages::Package;
use crate::resolver::ResolutionContext;
use std::sync::Arc;
use tracing::debug;

pub struct SequentialBuilder<'a> {
    ctx: &'a ResolutionContext,
}

impl<'a> SequentialBuilder<'a> {
    pub fn new(ctx: &'a ResolutionContext) -> Self {
        Self { ctx }
    }

    /// Closure of `roots` in a fresh result, ambiguities reconciled
    pub fn build(&self, roots: &[Arc<Package>]) -> Result<ClosureResult> {
        let mut result = ClosureResult::new();
        for root in roots {
            self.expand(Arc::clone(root), &mut result)?;
        }
        result.reconcile();
        Ok(result)
    }

    /// Add the closure of `root` to `result`
    ///
    /// Packages already in `result.binaries` are not expanded again.
    /// Ambiguities are not reconciled.
    pub fn expand(&self, root: Arc<Package>, result: &mut ClosureResult) -> Result<()> {
        self.ctx.check_index()?;

        let follow_recommends = self.ctx.settings.follow_recommends;
        let mut stack = vec![root];

        while let Some(pkg) = stack.pop() {
            if !result.binaries.insert(Arc::clone(&pkg)) {
                continue;
            }
            debug!("Expanding {}", pkg);

            let expansion = {
                let binaries = &result.binaries;
                expand_requirements(
                    self.ctx,
                    &pkg,
                    requirements_of(&pkg, follow_recommends),
                    &|name: &str| binaries.contains_name(name),
                )?
            };

            let deps = result.absorb(expansion);
            stack.extend(deps.into_iter().rev());
        }

        Ok(())
    }
}
