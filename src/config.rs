// src/config.rs

//! Run configuration
//!
//! Architecture policy and resolution settings, plus an optional JSON
//! config file whose values the command line extends or overrides.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Architecture of architecture-independent packages
pub const NOARCH: &str = "noarch";

/// One step of the architecture fallback sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchTier {
    Primary,
    Secondary,
    Noarch,
}

/// Which architectures requirements may resolve to, and in what order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchPolicy {
    pub primary: String,
    /// Compatible companion architecture (e.g. i686 on x86_64)
    pub secondary: Option<String>,
    /// Order in which provider queries are retried
    pub fallback: Vec<ArchTier>,
    /// Order in which pick-first prefers candidate architectures
    pub pick_first: Vec<ArchTier>,
}

impl ArchPolicy {
    /// Policy for `primary` with an explicit secondary architecture
    pub fn new(primary: &str, secondary: Option<&str>) -> Self {
        Self {
            primary: primary.to_string(),
            secondary: secondary.map(|s| s.to_string()),
            fallback: vec![ArchTier::Primary, ArchTier::Secondary, ArchTier::Noarch],
            pick_first: vec![ArchTier::Noarch, ArchTier::Primary, ArchTier::Secondary],
        }
    }

    /// Policy for `primary` with its usual multilib companion
    pub fn for_arch(primary: &str) -> Self {
        Self::new(primary, default_secondary(primary))
    }

    /// Policy for the machine we are running on
    pub fn host() -> Self {
        Self::for_arch(host_arch())
    }

    pub fn with_fallback(mut self, fallback: Vec<ArchTier>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Concrete architecture string for a tier, if configured
    pub fn arch_for(&self, tier: ArchTier) -> Option<&str> {
        match tier {
            ArchTier::Primary => Some(&self.primary),
            ArchTier::Secondary => self.secondary.as_deref(),
            ArchTier::Noarch => Some(NOARCH),
        }
    }

    /// Architectures to query, in fallback order
    pub fn fallback_arches(&self) -> Vec<&str> {
        self.fallback
            .iter()
            .filter_map(|tier| self.arch_for(*tier))
            .collect()
    }

    /// Architectures pick-first accepts, in preference order
    pub fn pick_first_arches(&self) -> Vec<&str> {
        self.pick_first
            .iter()
            .filter_map(|tier| self.arch_for(*tier))
            .collect()
    }

    pub fn is_secondary(&self, arch: &str) -> bool {
        self.secondary.as_deref() == Some(arch)
    }
}

impl Default for ArchPolicy {
    fn default() -> Self {
        Self::host()
    }
}

/// Architecture name as RPM spells it for this machine
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86" => "i686",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// Multilib companion architecture
pub fn default_secondary(primary: &str) -> Option<&'static str> {
    match primary {
        "x86_64" => Some("i686"),
        _ => None,
    }
}

/// Operator-supplied disambiguation and traversal settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionSettings {
    /// Preferred package names, first match wins
    pub hints: Vec<String>,
    /// Package names never added to a dependency set
    pub filters: BTreeSet<String>,
    /// Package names whose requiring parents get reported
    pub whatreqs: BTreeSet<String>,
    pub pick_first: bool,
    pub follow_recommends: bool,
    /// Upper bound for a single index query
    ///
    /// Bounded queries run on a fixed set of
    /// [`QUERY_WORKERS`](crate::resolver::QUERY_WORKERS) threads. A query
    /// that times out keeps its thread until the index returns.
    pub query_timeout: Option<Duration>,
}

impl ResolutionSettings {
    /// Defaults for runtime closures: Recommends are followed
    pub fn runtime() -> Self {
        Self {
            follow_recommends: true,
            ..Self::default()
        }
    }

    /// Defaults for build closures: Recommends are not followed
    pub fn build() -> Self {
        Self::default()
    }

    pub fn is_filtered(&self, name: &str) -> bool {
        self.filters.contains(name)
    }
}

/// JSON configuration file
///
/// ```json
/// {
///   "repos": ["/srv/repo/f25/x86_64/os", "/srv/repo/f25/source/tree"],
///   "hints": ["glibc-minimal-langpack"],
///   "filters": ["fedora-release"],
///   "secondary_arch": "none",
///   "query_timeout_ms": 30000
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub repos: Vec<String>,
    pub rpm_dirs: Vec<String>,
    pub db: Option<String>,
    pub hints: Vec<String>,
    pub filters: Vec<String>,
    pub whatreqs: Vec<String>,
    pub arch: Option<String>,
    /// `"none"` disables the secondary architecture
    pub secondary_arch: Option<String>,
    pub fallback: Option<Vec<ArchTier>>,
    pub query_timeout_ms: Option<u64>,
    pub jobs: Option<usize>,
}

impl ConfigFile {
    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: ConfigFile = serde_json::from_str(&content).map_err(|e| {
            Error::ConfigError(format!("Invalid config file {}: {}", path.display(), e))
        })?;

        if config.jobs == Some(0) {
            return Err(Error::ConfigError("jobs must be at least 1".to_string()));
        }

        Ok(config)
    }

    /// Build the architecture policy, letting explicit values win
    pub fn arch_policy(&self, arch: Option<&str>, secondary: Option<&str>) -> ArchPolicy {
        let primary = arch
            .or(self.arch.as_deref())
            .unwrap_or(host_arch())
            .to_string();

        let mut policy = match secondary.or(self.secondary_arch.as_deref()) {
            Some("none") | Some("") => ArchPolicy::new(&primary, None),
            Some(explicit) => ArchPolicy::new(&primary, Some(explicit)),
            None => ArchPolicy::for_arch(&primary),
        };

        if let Some(fallback) = &self.fallback {
            policy = policy.with_fallback(fallback.clone());
        }

        policy
    }

    /// Layer the file's hints, filters and whatreqs under `settings`
    ///
    /// File hints come after command-line hints, so the command line keeps
    /// precedence under first-match-wins.
    pub fn apply_to(&self, settings: &mut ResolutionSettings) {
        settings.hints.extend(self.hints.iter().cloned());
        settings.filters.extend(self.filters.iter().cloned());
        settings.whatreqs.extend(self.whatreqs.iter().cloned());
        if settings.query_timeout.is_none() {
            settings.query_timeout = self.query_timeout_ms.map(Duration::from_millis);
        }
    }
}
