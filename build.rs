// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn hint_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("hint")
            .long("hint")
            .action(ArgAction::Append)
            .help("Package to select when several could satisfy a dependency (repeatable, first match wins)"),
    )
    .arg(
        Arg::new("filter")
            .long("filter")
            .action(ArgAction::Append)
            .help("Package to skip during processing (repeatable)"),
    )
    .arg(
        Arg::new("whatreqs")
            .long("whatreqs")
            .action(ArgAction::Append)
            .help("Package whose requiring parents should be reported (repeatable)"),
    )
    .arg(
        Arg::new("pick_first")
            .long("pick-first")
            .action(ArgAction::SetTrue)
            .help("Select a candidate automatically when no hint applies"),
    )
    .arg(
        Arg::new("full_name")
            .long("full-name")
            .action(ArgAction::SetTrue)
            .help("Print epoch:name-version-release.arch instead of names"),
    )
}

fn build_cli() -> Command {
    Command::new("whatpkgs")
        .version(env!("CARGO_PKG_VERSION"))
        .author("whatpkgs Contributors")
        .about("Compute runtime and build dependency closures from yum/dnf repodata")
        .subcommand_required(true)
        .arg(
            Arg::new("repo")
                .long("repo")
                .value_name("LOCATION")
                .action(ArgAction::Append)
                .global(true)
                .help("Repository directory, file:// or http(s):// URL (repeatable)"),
        )
        .arg(
            Arg::new("rpm_dir")
                .long("rpm-dir")
                .value_name("DIR")
                .action(ArgAction::Append)
                .global(true)
                .help("Directory of .rpm files to index directly (repeatable)"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("PATH")
                .global(true)
                .help("SQLite index written by `whatpkgs import`"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("arch")
                .long("arch")
                .global(true)
                .help("Primary architecture (default: this machine's)"),
        )
        .arg(
            Arg::new("multilib_arch")
                .long("multilib-arch")
                .global(true)
                .help("Secondary compatible architecture, or \"none\""),
        )
        .arg(
            Arg::new("jobs")
                .short('j')
                .long("jobs")
                .global(true)
                .help("Worker threads for parallel closures (default: number of CPUs)"),
        )
        .arg(
            Arg::new("query_timeout_ms")
                .long("query-timeout-ms")
                .value_name("MS")
                .global(true)
                .help("Give up on a single index query after this many milliseconds"),
        )
        .subcommand(hint_args(
            Command::new("neededby")
                .about("Get package dependencies")
                .arg(Arg::new("pkgnames").required(true).num_args(1..).help("Package names, optionally as name#arch"))
                .arg(
                    Arg::new("recommends")
                        .long("recommends")
                        .value_name("BOOL")
                        .default_value("true")
                        .help("Follow Recommends"),
                )
                .arg(
                    Arg::new("sequential")
                        .long("sequential")
                        .action(ArgAction::SetTrue)
                        .help("Use the single-threaded builder"),
                ),
        ))
        .subcommand(hint_args(
            Command::new("neededtoselfhost")
                .about("Get build dependencies, recursively")
                .arg(Arg::new("pkgnames").required(true).num_args(1..).help("Package names, optionally as name#arch"))
                .arg(
                    Arg::new("recommends")
                        .long("recommends")
                        .value_name("BOOL")
                        .default_value("false")
                        .help("Follow Recommends of binary packages"),
                )
                .arg(
                    Arg::new("merge")
                        .long("merge")
                        .action(ArgAction::SetTrue)
                        .help("Accumulate all packages into one report"),
                )
                .arg(
                    Arg::new("sources")
                        .long("sources")
                        .value_name("BOOL")
                        .default_value("true")
                        .help("Print source packages (true) or binary packages (false)"),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .action(ArgAction::SetTrue)
                        .help("Use the multi-threaded builder"),
                ),
        ))
        .subcommand(
            Command::new("getsourcerpm")
                .about("Get source RPMs of binary packages")
                .arg(Arg::new("pkgnames").required(true).num_args(1..).help("Package names, optionally as name#arch"))
                .arg(
                    Arg::new("full_name")
                        .long("full-name")
                        .action(ArgAction::SetTrue)
                        .help("Print epoch:name-version-release.arch instead of names"),
                ),
        )
        .subcommand(
            Command::new("debugprovides")
                .about("Debug missing Provides")
                .arg(Arg::new("requires").required(true).help("Capability to look up")),
        )
        .subcommand(
            Command::new("import").about("Import repositories and RPM directories into a SQLite index"),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("whatpkgs.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
