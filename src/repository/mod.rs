// src/repository/mod.rs

//! Repository loading
//!
//! This module provides functionality for:
//! - Locating repositories on disk, via file:// or over HTTP(S)
//! - Fetching repodata with retry support
//! - Verifying metadata checksums
//! - Building a package index from repodata and RPM directories

pub mod repodata;

use crate::error::{Error, Result};
use crate::index::MemoryIndex;
use crate::packages::{rpm, Package};
use rayon::prelude::*;
use reqwest::blocking::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for failed downloads
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Where a repository's repodata lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoLocation {
    Local(PathBuf),
    Remote(String),
}

impl RepoLocation {
    /// Interpret a `--repo` argument
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            RepoLocation::Remote(location.trim_end_matches('/').to_string())
        } else if let Some(path) = location.strip_prefix("file://") {
            RepoLocation::Local(PathBuf::from(path))
        } else {
            RepoLocation::Local(PathBuf::from(location))
        }
    }
}

impl std::fmt::Display for RepoLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoLocation::Local(path) => write!(f, "{}", path.display()),
            RepoLocation::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// HTTP client wrapper with retry support
pub struct RepositoryClient {
    client: Client,
    max_retries: u32,
}

impl RepositoryClient {
    /// Create a new repository client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch a URL into memory, retrying transport failures
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching {}", url);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }

                    let bytes = response.bytes().map_err(|e| {
                        Error::DownloadError(format!("Failed to read response from {}: {}", url, e))
                    })?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {} after {} attempts: {}",
                            url, attempt, e
                        )));
                    }
                    warn!("Fetch attempt {} of {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

/// Read a file relative to the repository root
fn read_relative(
    location: &RepoLocation,
    client: Option<&RepositoryClient>,
    relative: &str,
) -> Result<Vec<u8>> {
    match location {
        RepoLocation::Local(root) => {
            let path = root.join(relative);
            fs::read(&path)
                .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))
        }
        RepoLocation::Remote(base) => {
            let client = match client {
                Some(client) => client,
                None => return Err(Error::DownloadError("No HTTP client".to_string())),
            };
            client.fetch(&format!("{}/{}", base, relative))
        }
    }
}

/// Verify data against a checksum from repomd.xml
///
/// Algorithms other than SHA-256 and SHA-512 are not verified.
pub fn verify_checksum(data: &[u8], checksum_type: &str, expected: &str) -> Result<()> {
    use sha2::{Digest, Sha256, Sha512};

    let actual = match checksum_type {
        "sha256" => format!("{:x}", Sha256::digest(data)),
        "sha512" => format!("{:x}", Sha512::digest(data)),
        other => {
            warn!("Cannot verify {} checksum, skipping verification", other);
            return Ok(());
        }
    };

    if actual != expected {
        return Err(Error::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }

    debug!("Checksum verified: {}", expected);
    Ok(())
}

/// Load every package of one repository
pub fn load_repository(location: &RepoLocation) -> Result<Vec<Package>> {
    info!("Loading repository {}", location);

    let client = match location {
        RepoLocation::Remote(_) => Some(RepositoryClient::new()?),
        RepoLocation::Local(_) => None,
    };

    let repomd = read_relative(location, client.as_ref(), "repodata/repomd.xml")?;
    let repomd = String::from_utf8(repomd)
        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in repomd.xml: {}", e)))?;
    let primary = repodata::parse_repomd(&repomd)?;

    let compressed = read_relative(location, client.as_ref(), &primary.href)?;
    if let (Some(kind), Some(expected)) = (&primary.checksum_type, &primary.checksum) {
        verify_checksum(&compressed, kind, expected)?;
    }

    let xml = repodata::decompress(&primary.href, &compressed)?;
    let packages = repodata::parse_primary(&xml)?;

    info!("Loaded {} packages from {}", packages.len(), location);
    Ok(packages)
}

/// Build an in-memory index from repositories and RPM directories
///
/// Sources are loaded in parallel; any failing source fails the whole load.
pub fn load_index(repos: &[String], rpm_dirs: &[String]) -> Result<MemoryIndex> {
    let from_repos: Vec<Vec<Package>> = repos
        .par_iter()
        .map(|repo| load_repository(&RepoLocation::parse(repo)))
        .collect::<Result<Vec<_>>>()?;

    let from_dirs: Vec<Vec<Package>> = rpm_dirs
        .par_iter()
        .map(|dir| rpm::read_directory(Path::new(dir)))
        .collect::<Result<Vec<_>>>()?;

    let index = MemoryIndex::new(from_repos.into_iter().chain(from_dirs).flatten());
    info!("Package index holds {} packages", index.len());
    Ok(index)
}
