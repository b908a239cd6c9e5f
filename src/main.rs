// src/main.rs

use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use whatpkgs::closure::{
    ClosureResult, DependencySet, ParallelBuilder, SelfHostBuilder, SequentialBuilder,
};
use whatpkgs::config::{ArchPolicy, ConfigFile, ResolutionSettings};
use whatpkgs::index::{get_pkg_by_name, get_source_for_package, PackageIndex, SqliteIndex};
use whatpkgs::packages::{split_pkgname, Package};
use whatpkgs::report::{self, ReportStyle};
use whatpkgs::resolver::ResolutionContext;
use whatpkgs::repository::{self, RepoLocation};

#[derive(Parser)]
#[command(name = "whatpkgs")]
#[command(author, version, about = "Compute runtime and build dependency closures from yum/dnf repodata", long_about = None)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where packages come from and how architectures are chosen
#[derive(Args)]
struct SourceArgs {
    /// Repository directory, file:// or http(s):// URL (repeatable)
    #[arg(long = "repo", global = true, value_name = "LOCATION")]
    repos: Vec<String>,

    /// Directory of .rpm files to index directly (repeatable)
    #[arg(long = "rpm-dir", global = true, value_name = "DIR")]
    rpm_dirs: Vec<String>,

    /// SQLite index written by `whatpkgs import`
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<String>,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<String>,

    /// Primary architecture (default: this machine's)
    #[arg(long, global = true)]
    arch: Option<String>,

    /// Secondary compatible architecture, or "none"
    #[arg(long = "multilib-arch", global = true)]
    multilib_arch: Option<String>,

    /// Worker threads for parallel closures (default: number of CPUs)
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Give up on a single index query after this many milliseconds
    #[arg(long = "query-timeout-ms", global = true, value_name = "MS")]
    query_timeout_ms: Option<u64>,
}

/// Disambiguation options shared by the closure commands
#[derive(Args)]
struct ResolveArgs {
    /// Package to select when several could satisfy a dependency (repeatable, first match wins)
    #[arg(long)]
    hint: Vec<String>,

    /// Package to skip during processing (repeatable)
    #[arg(long)]
    filter: Vec<String>,

    /// Package whose requiring parents should be reported (repeatable)
    #[arg(long)]
    whatreqs: Vec<String>,

    /// Select a candidate automatically when no hint applies
    #[arg(long, action = ArgAction::SetTrue)]
    pick_first: bool,

    /// Print epoch:name-version-release.arch instead of names
    #[arg(long, action = ArgAction::SetTrue)]
    full_name: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Get package dependencies
    Neededby {
        /// Package names, optionally as name#arch
        #[arg(required = true)]
        pkgnames: Vec<String>,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Follow Recommends
        #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
        recommends: bool,

        /// Use the single-threaded builder
        #[arg(long, action = ArgAction::SetTrue)]
        sequential: bool,
    },
    /// Get build dependencies, recursively
    Neededtoselfhost {
        /// Package names, optionally as name#arch
        #[arg(required = true)]
        pkgnames: Vec<String>,

        #[command(flatten)]
        resolve: ResolveArgs,

        /// Follow Recommends of binary packages
        #[arg(long, default_value_t = false, action = ArgAction::Set, value_name = "BOOL")]
        recommends: bool,

        /// Accumulate all packages into one report
        #[arg(long, action = ArgAction::SetTrue)]
        merge: bool,

        /// Print source packages (true) or binary packages (false)
        #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
        sources: bool,

        /// Use the multi-threaded builder
        #[arg(long, action = ArgAction::SetTrue)]
        parallel: bool,
    },
    /// Get source RPMs of binary packages
    Getsourcerpm {
        /// Package names, optionally as name#arch
        #[arg(required = true)]
        pkgnames: Vec<String>,

        /// Print epoch:name-version-release.arch instead of names
        #[arg(long, action = ArgAction::SetTrue)]
        full_name: bool,
    },
    /// Debug missing Provides
    Debugprovides {
        /// Capability to look up
        requires: String,
    },
    /// Import repositories and RPM directories into a SQLite index
    Import,
}

/// Everything loaded once per run
struct Session {
    index: Arc<dyn PackageIndex>,
    policy: ArchPolicy,
    config: ConfigFile,
    jobs: Option<usize>,
    query_timeout: Option<Duration>,
}

impl Session {
    fn open(args: &SourceArgs) -> Result<Self> {
        let config = load_config(args)?;
        let policy = config.arch_policy(args.arch.as_deref(), args.multilib_arch.as_deref());
        let index = open_index(args, &config)?;

        Ok(Self {
            index,
            policy,
            jobs: args.jobs.or(config.jobs),
            query_timeout: args
                .query_timeout_ms
                .or(config.query_timeout_ms)
                .map(Duration::from_millis),
            config,
        })
    }

    /// Resolution context for one command
    fn context(&self, mut settings: ResolutionSettings, resolve: Option<&ResolveArgs>) -> ResolutionContext {
        if let Some(resolve) = resolve {
            settings.hints.extend(resolve.hint.iter().cloned());
            settings.filters.extend(resolve.filter.iter().cloned());
            settings.whatreqs.extend(resolve.whatreqs.iter().cloned());
            settings.pick_first = resolve.pick_first;
        }
        settings.query_timeout = self.query_timeout;
        self.config.apply_to(&mut settings);

        ResolutionContext::new(Arc::clone(&self.index), self.policy.clone(), settings)
    }

    fn parallel<'a>(&self, ctx: &'a ResolutionContext) -> ParallelBuilder<'a> {
        match self.jobs {
            Some(jobs) => ParallelBuilder::new(ctx).workers(jobs),
            None => ParallelBuilder::new(ctx),
        }
    }
}

fn load_config(args: &SourceArgs) -> Result<ConfigFile> {
    let mut config = match &args.config {
        Some(path) => ConfigFile::load(Path::new(path))?,
        None => ConfigFile::default(),
    };

    // Sources on the command line replace those of the file
    if !args.repos.is_empty() || !args.rpm_dirs.is_empty() {
        config.repos = args.repos.clone();
        config.rpm_dirs = args.rpm_dirs.clone();
    }
    if args.db.is_some() {
        config.db = args.db.clone();
    }
    Ok(config)
}

fn open_index(args: &SourceArgs, config: &ConfigFile) -> Result<Arc<dyn PackageIndex>> {
    // A database given on the command line wins over repositories from the file
    let prefer_db = args.db.is_some() || (config.repos.is_empty() && config.rpm_dirs.is_empty());

    match &config.db {
        Some(db_path) if prefer_db => {
            info!("Using package index database {}", db_path);
            Ok(Arc::new(SqliteIndex::open(db_path)?))
        }
        _ if config.repos.is_empty() && config.rpm_dirs.is_empty() => Err(anyhow::anyhow!(
            "No package source given; use --repo, --rpm-dir or --db"
        )),
        _ => Ok(Arc::new(repository::load_index(&config.repos, &config.rpm_dirs)?)),
    }
}

/// Look up root packages, skipping filtered names
///
/// Lookup failures are logged and counted; only run-fatal errors abort.
fn lookup_roots(
    ctx: &ResolutionContext,
    pkgnames: &[String],
    failures: &mut usize,
) -> whatpkgs::Result<Vec<Arc<Package>>> {
    let mut roots = Vec::new();
    for fullname in pkgnames {
        let (name, arch) = split_pkgname(fullname);

        if ctx.settings.is_filtered(name) {
            info!("Skipping filtered package {}", name);
            continue;
        }

        match get_pkg_by_name(ctx.index(), &ctx.policy, name, arch) {
            Ok(pkg) => roots.push(pkg),
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                error!("{}", e);
                *failures += 1;
            }
        }
    }
    Ok(roots)
}

/// Sources or binaries of a self-host result, as requested
fn reported_set(result: &ClosureResult, sources: bool) -> &DependencySet {
    if sources {
        &result.sources
    } else {
        &result.binaries
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

fn finish(failures: usize) -> Result<()> {
    if failures > 0 {
        return Err(anyhow::anyhow!("{} package(s) could not be processed", failures));
    }
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the report
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Neededby {
            pkgnames,
            resolve,
            recommends,
            sequential,
        } => {
            let session = Session::open(&cli.source)?;
            let mut settings = ResolutionSettings::runtime();
            settings.follow_recommends = recommends;
            let ctx = session.context(settings, Some(&resolve));

            let mut failures = 0;
            let roots = lookup_roots(&ctx, &pkgnames, &mut failures)?;

            let result = if sequential {
                SequentialBuilder::new(&ctx).build(&roots)?
            } else {
                session.parallel(&ctx).build(&roots)?
            };

            let style = ReportStyle {
                full_names: resolve.full_name,
            };
            print_lines(report::set_lines(&result.binaries, &ctx.policy, style, None));
            print_lines(report::ambiguity_lines(&result.ambiguities, style));

            finish(failures)
        }
        Commands::Neededtoselfhost {
            pkgnames,
            resolve,
            recommends,
            merge,
            sources,
            parallel,
        } => {
            let session = Session::open(&cli.source)?;
            let mut settings = ResolutionSettings::build();
            settings.follow_recommends = recommends;
            let ctx = session.context(settings, Some(&resolve));
            let style = ReportStyle {
                full_names: resolve.full_name,
            };

            let expand = |root: Arc<Package>, result: &mut ClosureResult| -> whatpkgs::Result<()> {
                if parallel {
                    session.parallel(&ctx).self_host(true).expand(&[root], result)
                } else {
                    SelfHostBuilder::new(&ctx).expand(root, result)
                }
            };
            let mut failures = 0;
            let mut merged = ClosureResult::new();

            for fullname in &pkgnames {
                let roots = lookup_roots(&ctx, std::slice::from_ref(fullname), &mut failures)?;
                let Some(root) = roots.into_iter().next() else {
                    continue;
                };

                let mut fresh = ClosureResult::new();
                let result = if merge { &mut merged } else { &mut fresh };

                match expand(Arc::clone(&root), &mut *result) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal_for_run() => return Err(e.into()),
                    Err(e) => {
                        error!("{}: {}", root, e);
                        failures += 1;
                        continue;
                    }
                }
                result.reconcile();

                if !merge {
                    println!("{}", report::root_header(&root));
                    print_lines(report::set_lines(
                        reported_set(result, sources),
                        &ctx.policy,
                        style,
                        Some(root.as_ref()),
                    ));
                    print_lines(report::ambiguity_lines(&result.ambiguities, style));
                }
            }

            if merge {
                print_lines(report::set_lines(
                    reported_set(&merged, sources),
                    &ctx.policy,
                    style,
                    None,
                ));
                print_lines(report::ambiguity_lines(&merged.ambiguities, style));
            }

            finish(failures)
        }
        Commands::Getsourcerpm {
            pkgnames,
            full_name,
        } => {
            let session = Session::open(&cli.source)?;
            let ctx = session.context(ResolutionSettings::build(), None);

            let mut failures = 0;
            let binaries = lookup_roots(&ctx, &pkgnames, &mut failures)?;

            let mut sources = DependencySet::source();
            for binary in binaries {
                match get_source_for_package(ctx.index(), &binary) {
                    Ok(source) => {
                        sources.insert(source);
                    }
                    Err(e) if e.is_fatal_for_run() => return Err(e.into()),
                    Err(e) => {
                        error!("{}", e);
                        failures += 1;
                    }
                }
            }

            let style = ReportStyle {
                full_names: full_name,
            };
            print_lines(report::set_lines(&sources, &ctx.policy, style, None));

            finish(failures)
        }
        Commands::Debugprovides { requires } => {
            let session = Session::open(&cli.source)?;
            let ctx = session.context(ResolutionSettings::runtime(), None);

            let providers = ctx.providers(&requires)?;
            if providers.is_empty() {
                return Err(anyhow::anyhow!("No package for [{}]", requires));
            }
            for pkg in providers {
                println!("{}", pkg.nevra());
            }
            Ok(())
        }
        Commands::Import => {
            let db_path = cli
                .source
                .db
                .clone()
                .ok_or_else(|| anyhow::anyhow!("import needs --db PATH"))?;
            let config = load_config(&cli.source)?;

            if config.repos.is_empty() && config.rpm_dirs.is_empty() {
                return Err(anyhow::anyhow!("Nothing to import; use --repo or --rpm-dir"));
            }

            let mut total = 0;
            for repo in &config.repos {
                let packages = repository::load_repository(&RepoLocation::parse(repo))?;
                total += whatpkgs::index::sqlite::import_packages(&db_path, repo, &packages)?;
            }
            for dir in &config.rpm_dirs {
                let packages = whatpkgs::packages::rpm::read_directory(Path::new(dir))?;
                total += whatpkgs::index::sqlite::import_packages(&db_path, dir, &packages)?;
            }

            println!("Imported {} packages into {}", total, db_path);
            Ok(())
        }
    }
}
