// src/packages/mod.rs

//! Package model and package file support
//!
//! [`Package`] is the unit every index adapter returns and the closure
//! engine traverses. The `rpm` submodule reads `.rpm` headers directly.

pub mod package;
pub mod rpm;

pub use package::{split_pkgname, split_rpm_filename, DepKey, Package, RpmFilename, SOURCE_ARCH};
