// src/packages/rpm.rs

//! RPM header reader
//!
//! Turns `.rpm` files into [`Package`] values so a directory of packages
//! can serve as an index without any repodata.

use super::package::{split_rpm_filename, Package, SOURCE_ARCH};
use crate::error::{Error, Result};
use rpm::{Dependency, DependencyFlags};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

/// Flags marking a requirement needed before or while scriptlets run
fn is_prereq(dep: &Dependency) -> bool {
    dep.flags.intersects(
        DependencyFlags::PREREQ
            | DependencyFlags::SCRIPT_PRE
            | DependencyFlags::SCRIPT_POST
            | DependencyFlags::SCRIPT_PREUN
            | DependencyFlags::SCRIPT_POSTUN,
    )
}

/// Dependencies on rpmlib features are satisfied by rpm itself
fn is_rpmlib(dep: &Dependency) -> bool {
    dep.name.starts_with("rpmlib(")
}

/// Parse a single `.rpm` file
pub fn read_package(path: &Path) -> Result<Package> {
    debug!("Parsing RPM package: {}", path.display());

    let file = File::open(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))?;
    let mut buf_reader = BufReader::new(file);

    let pkg = rpm::Package::parse(&mut buf_reader)
        .map_err(|e| Error::ParseError(format!("Failed to parse {}: {}", path.display(), e)))?;
    let header = &pkg.metadata;

    let field = |what: &str, e: rpm::Error| {
        Error::ParseError(format!("Failed to get {} of {}: {}", what, path.display(), e))
    };

    let name = header.get_name().map_err(|e| field("name", e))?;
    let version = header.get_version().map_err(|e| field("version", e))?;
    let release = header.get_release().map_err(|e| field("release", e))?;
    let epoch = header.get_epoch().unwrap_or(0);

    // Source packages carry no SOURCERPM tag
    let source_rpm = header.get_source_rpm().ok().map(|s| s.to_string());
    let (arch, source_name) = match source_rpm {
        Some(filename) => {
            let arch = header.get_arch().map_err(|e| field("arch", e))?;
            let source = split_rpm_filename(&filename)?;
            (arch.to_string(), Some(source.name))
        }
        None => (SOURCE_ARCH.to_string(), None),
    };

    let mut package = Package::new(name, version, release, &arch).with_epoch(epoch);
    package.source_name = source_name;

    if let Ok(provides) = header.get_provides() {
        package.provides = provides.into_iter().map(|d| d.name).collect();
    }

    if let Ok(requires) = header.get_requires() {
        for dep in requires.into_iter().filter(|d| !is_rpmlib(d)) {
            if is_prereq(&dep) {
                package.requires_pre.push(dep.name);
            } else {
                package.requires.push(dep.name);
            }
        }
    }

    if let Ok(recommends) = header.get_recommends() {
        package.recommends = recommends.into_iter().map(|d| d.name).collect();
    }

    debug!(
        "Parsed RPM: {} ({} requires, {} pre-requires, {} recommends)",
        package.nevra(),
        package.requires.len(),
        package.requires_pre.len(),
        package.recommends.len()
    );

    Ok(package)
}

/// Parse every `.rpm` file directly inside `dir`
///
/// Files that fail to parse are skipped with a warning.
pub fn read_directory(dir: &Path) -> Result<Vec<Package>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", dir.display(), e)))?;

    let mut packages = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rpm") {
            continue;
        }
        match read_package(&path) {
            Ok(package) => packages.push(package),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    Ok(packages)
}
