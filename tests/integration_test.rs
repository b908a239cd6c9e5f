// tests/integration_test.rs

//! Integration tests for whatpkgs
//!
//! These tests drive whole closures through the public API: repodata on
//! disk, the in-memory and SQLite indexes, and every builder.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use whatpkgs::closure::{ClosureResult, ParallelBuilder, SelfHostBuilder, SequentialBuilder};
use whatpkgs::config::{ArchPolicy, ResolutionSettings};
use whatpkgs::index::{get_pkg_by_name, MemoryIndex, PackageIndex, SqliteIndex};
use whatpkgs::packages::Package;
use whatpkgs::repository::{load_repository, RepoLocation};
use whatpkgs::resolver::ResolutionContext;
use whatpkgs::Error;

fn context(packages: Vec<Package>, settings: ResolutionSettings) -> ResolutionContext {
    let index: Arc<dyn PackageIndex> = Arc::new(MemoryIndex::new(packages));
    ResolutionContext::new(index, ArchPolicy::for_arch("x86_64"), settings)
}

fn root(ctx: &ResolutionContext, name: &str) -> Arc<Package> {
    get_pkg_by_name(ctx.index(), &ctx.policy, name, None).unwrap()
}

fn keys(result: &ClosureResult) -> Vec<String> {
    result.binaries.iter().map(|(key, _)| key.to_string()).collect()
}

fn libfoo_universe() -> Vec<Package> {
    vec![
        Package::new("app", "1.0", "1", "x86_64").with_requires(["libfoo"]),
        Package::new("libfoo-v1", "1.0", "1", "x86_64").with_provides(["libfoo"]),
        Package::new("libfoo-v2", "2.0", "1", "x86_64").with_provides(["libfoo"]),
    ]
}

#[test]
fn test_ambiguous_requirement_is_recorded_not_followed() {
    let ctx = context(libfoo_universe(), ResolutionSettings::runtime());
    let app = root(&ctx, "app");

    let result = SequentialBuilder::new(&ctx).build(&[app]).unwrap();

    assert_eq!(keys(&result), vec!["app#x86_64"]);
    assert_eq!(result.ambiguities.len(), 1);

    let record = result.ambiguities.sorted()[0];
    assert!(record.requirements.contains("libfoo"));
    let candidates: Vec<&str> = record
        .candidates
        .values()
        .map(|pkg| pkg.name.as_str())
        .collect();
    assert_eq!(candidates, vec!["libfoo-v1", "libfoo-v2"]);
}

#[test]
fn test_hint_settles_ambiguity() {
    let mut settings = ResolutionSettings::runtime();
    settings.hints = vec!["libfoo-v2".to_string()];
    let ctx = context(libfoo_universe(), settings);
    let app = root(&ctx, "app");

    let result = SequentialBuilder::new(&ctx).build(&[app]).unwrap();

    assert_eq!(keys(&result), vec!["app#x86_64", "libfoo-v2#x86_64"]);
    assert!(result.ambiguities.is_empty());
}

#[test]
fn test_hint_precedence_ignores_enumeration_order() {
    let mut reversed = libfoo_universe();
    reversed.reverse();

    for packages in [libfoo_universe(), reversed] {
        let mut settings = ResolutionSettings::runtime();
        settings.hints = vec!["libfoo-v1".to_string()];
        let ctx = context(packages, settings);
        let app = root(&ctx, "app");

        let result = SequentialBuilder::new(&ctx).build(&[app]).unwrap();
        assert_eq!(keys(&result), vec!["app#x86_64", "libfoo-v1#x86_64"]);
    }
}

#[test]
fn test_closure_is_idempotent() {
    let ctx = context(libfoo_universe(), ResolutionSettings::runtime());
    let app = root(&ctx, "app");

    let first = SequentialBuilder::new(&ctx).build(&[Arc::clone(&app)]).unwrap();
    let second = SequentialBuilder::new(&ctx).build(&[app]).unwrap();

    assert_eq!(first.binaries.keys(), second.binaries.keys());
    for (key, pkg) in first.binaries.iter() {
        assert_eq!(second.binaries.get(key).unwrap().nevra(), pkg.nevra());
    }
}

#[test]
fn test_mutual_requirements_terminate() {
    let ctx = context(
        vec![
            Package::new("a", "1", "1", "x86_64").with_requires(["b"]),
            Package::new("b", "1", "1", "x86_64").with_requires(["a"]),
        ],
        ResolutionSettings::runtime(),
    );
    let a = root(&ctx, "a");

    let result = SequentialBuilder::new(&ctx).build(&[Arc::clone(&a)]).unwrap();
    assert_eq!(keys(&result), vec!["a#x86_64", "b#x86_64"]);

    let parallel = ParallelBuilder::new(&ctx).workers(4).build(&[a]).unwrap();
    assert_eq!(keys(&parallel), vec!["a#x86_64", "b#x86_64"]);
}

#[test]
fn test_filtered_provider_never_enters_closure() {
    let mut settings = ResolutionSettings::runtime();
    settings.filters.insert("fedora-release".to_string());
    let ctx = context(
        vec![
            Package::new("app", "1", "1", "x86_64").with_requires(["system-release", "zlib"]),
            Package::new("fedora-release", "25", "1", "noarch").with_provides(["system-release"]),
            Package::new("zlib", "1.2", "1", "x86_64"),
        ],
        settings,
    );
    let app = root(&ctx, "app");

    let result = SequentialBuilder::new(&ctx).build(&[app]).unwrap();

    assert_eq!(keys(&result), vec!["app#x86_64", "zlib#x86_64"]);
    assert!(result.diagnostics.filtered.contains("fedora-release"));
    assert!(result.ambiguities.is_empty());
}

#[test]
fn test_pick_first_chooses_the_same_candidate_every_run() {
    let mut settings = ResolutionSettings::runtime();
    settings.pick_first = true;
    let ctx = context(libfoo_universe(), settings);

    let mut chosen = Vec::new();
    for _ in 0..5 {
        let app = root(&ctx, "app");
        let result = ParallelBuilder::new(&ctx).workers(3).build(&[app]).unwrap();
        assert!(result.ambiguities.is_empty());
        chosen.push(keys(&result));
    }

    assert_eq!(chosen[0].len(), 2);
    assert!(chosen.iter().all(|run| run == &chosen[0]));
}

#[test]
fn test_unresolved_requirement_is_not_fatal() {
    let ctx = context(
        vec![Package::new("app", "1", "1", "x86_64").with_requires(["libmissing.so.1"])],
        ResolutionSettings::runtime(),
    );
    let app = root(&ctx, "app");

    let result = SequentialBuilder::new(&ctx).build(&[app]).unwrap();

    assert_eq!(keys(&result), vec!["app#x86_64"]);
    assert!(
        result
            .diagnostics
            .unresolved
            .contains(&("libmissing.so.1".to_string(), "app-1-1.x86_64".to_string()))
    );
}

#[test]
fn test_unknown_root_is_no_such_package() {
    let ctx = context(libfoo_universe(), ResolutionSettings::runtime());
    assert!(matches!(
        get_pkg_by_name(ctx.index(), &ctx.policy, "nope", None),
        Err(Error::NoSuchPackage(_))
    ));
}

/// A small distribution: tools that need each other to build
fn distro() -> Vec<Package> {
    let mut packages = Vec::new();
    let binaries = [
        ("coreutils", vec!["glibc"], "coreutils"),
        ("glibc", vec![], "glibc"),
        ("gcc", vec!["glibc", "binutils"], "gcc"),
        ("binutils", vec!["glibc"], "binutils"),
        ("make", vec!["glibc"], "make"),
        ("perl", vec!["glibc"], "perl"),
        ("autoconf", vec!["perl"], "autoconf"),
    ];
    for (name, requires, source) in binaries {
        packages.push(
            Package::new(name, "1", "1", "x86_64")
                .with_requires(requires)
                .with_source(source),
        );
    }

    let sources = [
        ("coreutils", vec!["gcc", "make", "autoconf"]),
        ("glibc", vec!["gcc", "make", "perl"]),
        ("gcc", vec!["gcc", "make"]),
        ("binutils", vec!["gcc"]),
        ("make", vec!["gcc"]),
        ("perl", vec!["gcc", "make"]),
        ("autoconf", vec!["perl", "make"]),
    ];
    for (name, requires) in sources {
        packages.push(Package::new(name, "1", "1", "src").with_requires(requires));
    }
    packages
}

#[test]
fn test_self_host_closure_reaches_every_source() {
    let ctx = context(distro(), ResolutionSettings::build());
    let coreutils = root(&ctx, "coreutils");

    let result = SelfHostBuilder::new(&ctx).build(coreutils).unwrap();

    let sources: Vec<String> = result.sources.iter().map(|(key, _)| key.to_string()).collect();
    assert_eq!(
        sources,
        vec!["autoconf", "binutils", "coreutils", "gcc", "glibc", "make", "perl"]
    );
    assert_eq!(result.binaries.len(), 7);
}

#[test]
fn test_sequential_and_parallel_agree() {
    let ctx = context(distro(), ResolutionSettings::build());
    let roots = vec![root(&ctx, "coreutils"), root(&ctx, "autoconf")];

    let sequential = SequentialBuilder::new(&ctx).build(&roots).unwrap();
    let parallel = ParallelBuilder::new(&ctx).workers(4).build(&roots).unwrap();
    assert_eq!(sequential.binaries.keys(), parallel.binaries.keys());

    let self_host = SelfHostBuilder::new(&ctx).build(Arc::clone(&roots[0])).unwrap();
    let parallel_self_host = ParallelBuilder::new(&ctx)
        .workers(4)
        .self_host(true)
        .build(&roots[..1])
        .unwrap();
    assert_eq!(self_host.binaries.keys(), parallel_self_host.binaries.keys());
    assert_eq!(self_host.sources.keys(), parallel_self_host.sources.keys());
}

const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="6">
<package type="rpm">
  <name>app</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.0" rel="1.fc25"/>
  <format>
    <rpm:sourcerpm>app-1.0-1.fc25.src.rpm</rpm:sourcerpm>
    <rpm:requires>
      <rpm:entry name="/bin/sh" pre="1"/>
      <rpm:entry name="libfoo.so.1()(64bit)"/>
    </rpm:requires>
  </format>
</package>
<package type="rpm">
  <name>libfoo</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.2" rel="3.fc25"/>
  <format>
    <rpm:sourcerpm>libfoo-1.2-3.fc25.src.rpm</rpm:sourcerpm>
    <rpm:provides>
      <rpm:entry name="libfoo.so.1()(64bit)"/>
    </rpm:provides>
  </format>
</package>
<package type="rpm">
  <name>libfoo-devel</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="1.2" rel="3.fc25"/>
  <format>
    <rpm:sourcerpm>libfoo-1.2-3.fc25.src.rpm</rpm:sourcerpm>
    <rpm:requires>
      <rpm:entry name="libfoo.so.1()(64bit)"/>
    </rpm:requires>
  </format>
</package>
<package type="rpm">
  <name>bash</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="4.4.12" rel="1.fc25"/>
  <format>
    <rpm:sourcerpm>bash-4.4.12-1.fc25.src.rpm</rpm:sourcerpm>
    <file>/bin/sh</file>
  </format>
</package>
<package type="rpm">
  <name>app</name>
  <arch>src</arch>
  <version epoch="0" ver="1.0" rel="1.fc25"/>
  <format>
    <rpm:requires>
      <rpm:entry name="libfoo-devel"/>
    </rpm:requires>
  </format>
</package>
<package type="rpm">
  <name>libfoo</name>
  <arch>src</arch>
  <version epoch="0" ver="1.2" rel="3.fc25"/>
  <format>
    <rpm:requires>
      <rpm:entry name="bash"/>
    </rpm:requires>
  </format>
</package>
<package type="rpm">
  <name>bash</name>
  <arch>src</arch>
  <version epoch="0" ver="4.4.12" rel="1.fc25"/>
  <format/>
</package>
</metadata>"#;

fn write_repository(root: &Path) {
    let repodata = root.join("repodata");
    fs::create_dir_all(&repodata).unwrap();
    fs::write(repodata.join("primary.xml"), PRIMARY).unwrap();

    let checksum = format!("{:x}", Sha256::digest(PRIMARY.as_bytes()));
    let repomd = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">{}</checksum>
    <location href="repodata/primary.xml"/>
  </data>
</repomd>"#,
        checksum
    );
    fs::write(repodata.join("repomd.xml"), repomd).unwrap();
}

#[test]
fn test_repository_import_and_self_host_from_database() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    write_repository(&repo);

    let packages = load_repository(&RepoLocation::Local(repo.clone())).unwrap();
    assert_eq!(packages.len(), 7);

    let db_path = dir.path().join("index/whatpkgs.db");
    let db_path = db_path.to_str().unwrap();
    let written =
        whatpkgs::index::sqlite::import_packages(db_path, repo.to_str().unwrap(), &packages)
            .unwrap();
    assert_eq!(written, 7);

    let index: Arc<dyn PackageIndex> = Arc::new(SqliteIndex::open(db_path).unwrap());
    let ctx = ResolutionContext::new(
        index,
        ArchPolicy::for_arch("x86_64"),
        ResolutionSettings::build(),
    );
    let app = root(&ctx, "app");

    let runtime = SequentialBuilder::new(&ctx).build(&[Arc::clone(&app)]).unwrap();
    assert_eq!(keys(&runtime), vec!["app#x86_64", "bash#x86_64", "libfoo#x86_64"]);

    let self_host = SelfHostBuilder::new(&ctx).build(app).unwrap();
    assert_eq!(
        keys(&self_host),
        vec![
            "app#x86_64",
            "bash#x86_64",
            "libfoo#x86_64",
            "libfoo-devel#x86_64"
        ]
    );
    let sources: Vec<String> = self_host
        .sources
        .iter()
        .map(|(key, _)| key.to_string())
        .collect();
    assert_eq!(sources, vec!["app", "bash", "libfoo"]);
}

#[test]
fn test_corrupted_repodata_fails_checksum() {
    let dir = tempfile::tempdir().unwrap();
    write_repository(dir.path());
    fs::write(dir.path().join("repodata/primary.xml"), "<metadata/>").unwrap();

    assert!(matches!(
        load_repository(&RepoLocation::Local(dir.path().to_path_buf())),
        Err(Error::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_database_without_pre_requires_aborts_closure() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("old.db");

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    conn.execute_batch(
        "CREATE TABLE schema_version (
             version INTEGER PRIMARY KEY,
             applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
         );
         INSERT INTO schema_version (version) VALUES (1);",
    )
    .unwrap();
    drop(conn);

    let index: Arc<dyn PackageIndex> =
        Arc::new(SqliteIndex::open(db_path.to_str().unwrap()).unwrap());
    let ctx = ResolutionContext::new(
        index,
        ArchPolicy::for_arch("x86_64"),
        ResolutionSettings::runtime(),
    );
    let app = Arc::new(Package::new("app", "1", "1", "x86_64"));

    let err = SequentialBuilder::new(&ctx).build(&[app]).unwrap_err();
    assert!(matches!(err, Error::IndexIncompatible(_)));
    assert!(err.is_fatal_for_run());
}
