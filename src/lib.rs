// src/lib.rs

//! whatpkgs
//!
//! Computes transitive dependency closures over yum/dnf repositories:
//! which binary packages a set of packages pulls in at runtime, and which
//! binary and source packages are needed to build them from source,
//! recursively.
//!
//! # Architecture
//!
//! - Index: packages come from repodata, RPM headers or a SQLite import,
//!   all behind the `PackageIndex` trait
//! - Resolver: one symbolic requirement to one package, with architecture
//!   fallback, hints, pick-first and filters
//! - Closure: sequential, self-host and parallel builders over a shared,
//!   read-only index; ambiguities are reconciled at the end

pub mod closure;
pub mod config;
pub mod db;
mod error;
pub mod index;
pub mod packages;
pub mod report;
pub mod repository;
pub mod resolver;
pub mod version;

pub use error::{Error, Result};
