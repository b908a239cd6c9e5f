// src/closure/reconcile.rs

//! Ambiguity reconciliation
//!
//! A requirement can be ambiguous on one edge of the graph while another
//! edge pulls in one of its candidates explicitly. Such records are moot
//! once the closure is complete.

use super::{AmbiguityList, DependencySet};
use tracing::debug;

/// Keep only the records none of whose candidates made it into `binaries`
pub fn reconcile(binaries: &DependencySet, mut ambiguities: AmbiguityList) -> AmbiguityList {
    let before = ambiguities.len();
    ambiguities.retain(|record| !record.is_resolved_by(binaries));

    let dropped = before - ambiguities.len();
    if dropped > 0 {
        debug!("{} ambiguities settled by other dependencies", dropped);
    }
    ambiguities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::closure::tests::pkg;
    use crate::closure::AmbiguityRecord;
    use crate::packages::Package;

    #[test]
    fn test_reconcile_drops_settled_records() {
        let parent = Package::new("app", "1", "1", "x86_64");

        let mut binaries = DependencySet::binary();
        binaries.insert(pkg("libfoo-v2", "x86_64"));

        let ambiguities: AmbiguityList = vec![
            AmbiguityRecord::new(
                "libfoo",
                &parent,
                &[pkg("libfoo-v1", "x86_64"), pkg("libfoo-v2", "x86_64")],
            ),
            AmbiguityRecord::new(
                "libbar",
                &parent,
                &[pkg("libbar-a", "x86_64"), pkg("libbar-b", "x86_64")],
            ),
        ]
        .into_iter()
        .collect();

        let remaining = reconcile(&binaries, ambiguities);
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().next().unwrap().requirements.contains("libbar"));
    }

    #[test]
    fn test_reconcile_matches_on_arch_too() {
        let parent = Package::new("app", "1", "1", "x86_64");

        let mut binaries = DependencySet::binary();
        binaries.insert(pkg("libfoo", "i686"));

        let ambiguities: AmbiguityList = std::iter::once(AmbiguityRecord::new(
            "libfoo.so",
            &parent,
            &[pkg("libfoo", "x86_64"), pkg("libfoo-compat", "x86_64")],
        ))
        .collect();

        assert_eq!(reconcile(&binaries, ambiguities).len(), 1);
    }

    #[test]
    fn test_reconcile_empty() {
        let binaries = DependencySet::binary();
        assert!(reconcile(&binaries, AmbiguityList::new()).is_empty());
    }
}
