// src/repository/repodata.rs

//! RPM repodata parser
//!
//! Parses `repodata/repomd.xml` to locate the primary metadata and turns
//! `primary.xml` into [`Package`] values. Only what the resolver needs is
//! kept: identity, provides (including file paths), requires split into
//! regular and pre-install, recommends, and the source package name.

use crate::error::{Error, Result};
use crate::packages::{split_rpm_filename, Package, SOURCE_ARCH};
use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;
use tracing::{debug, warn};

/// Location and checksum of the primary metadata file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryLocation {
    pub href: String,
    pub checksum_type: Option<String>,
    pub checksum: Option<String>,
}

/// Value of attribute `key` on an element
fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Find the primary data entry in repomd.xml
pub fn parse_repomd(xml_content: &str) -> Result<PrimaryLocation> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_primary = false;
    let mut in_checksum = false;
    let mut href = None;
    let mut checksum_type = None;
    let mut checksum = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"data" => in_primary = attribute(&e, b"type").as_deref() == Some("primary"),
                b"checksum" if in_primary => {
                    in_checksum = true;
                    checksum_type = attribute(&e, b"type");
                }
                b"location" if in_primary => href = attribute(&e, b"href"),
                _ => {}
            },
            Ok(Event::Empty(e)) if in_primary && e.local_name().as_ref() == b"location" => {
                href = attribute(&e, b"href");
            }
            Ok(Event::Text(e)) if in_checksum => {
                checksum = Some(e.unescape().unwrap_or_default().to_string());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"data" => {
                    if in_primary && href.is_some() {
                        break;
                    }
                    in_primary = false;
                }
                b"checksum" => in_checksum = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse repomd.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    let href = href.ok_or_else(|| {
        Error::ParseError("Could not find primary data location in repomd.xml".to_string())
    })?;

    Ok(PrimaryLocation {
        href,
        checksum_type,
        checksum,
    })
}

/// Decompress primary metadata according to its file extension
pub fn decompress(location: &str, bytes: &[u8]) -> Result<String> {
    let decompressed = if location.ends_with(".zst") {
        debug!("Decompressing zstd-compressed {}", location);
        zstd::decode_all(bytes)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?
    } else if location.ends_with(".gz") {
        debug!("Decompressing gzip-compressed {}", location);
        let mut decompressed = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
        decompressed
    } else if location.ends_with(".xz") {
        debug!("Decompressing xz-compressed {}", location);
        let mut decompressed = Vec::new();
        xz2::read::XzDecoder::new(bytes)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
        decompressed
    } else if location.ends_with(".bz2") {
        return Err(Error::ParseError(format!(
            "bzip2-compressed metadata is not supported: {}",
            location
        )));
    } else {
        bytes.to_vec()
    };

    String::from_utf8(decompressed)
        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", location, e)))
}

/// Section of `<format>` whose `<rpm:entry>` elements are being read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Provides,
    Requires,
    Recommends,
    Other,
}

/// Builder for constructing a Package from XML parsing
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    arch: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    sourcerpm: Option<String>,
    provides: Vec<String>,
    requires: Vec<String>,
    requires_pre: Vec<String>,
    recommends: Vec<String>,
}

impl PackageBuilder {
    fn entry(&mut self, section: Section, e: &BytesStart) {
        let Some(name) = attribute(e, b"name") else {
            return;
        };
        if name.starts_with("rpmlib(") {
            return;
        }

        match section {
            Section::Provides => self.provides.push(name),
            Section::Requires => {
                let pre = matches!(attribute(e, b"pre").as_deref(), Some("1") | Some("true"));
                if pre {
                    self.requires_pre.push(name);
                } else {
                    self.requires.push(name);
                }
            }
            Section::Recommends => self.recommends.push(name),
            Section::None | Section::Other => {}
        }
    }

    fn build(self) -> Result<Package> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let arch = self
            .arch
            .ok_or_else(|| Error::ParseError(format!("Missing arch for {}", name)))?;
        let ver = self
            .ver
            .ok_or_else(|| Error::ParseError(format!("Missing version for {}", name)))?;
        let rel = self
            .rel
            .ok_or_else(|| Error::ParseError(format!("Missing release for {}", name)))?;
        let epoch = match self.epoch.as_deref() {
            None | Some("") => 0,
            Some(epoch) => epoch
                .parse()
                .map_err(|e| Error::ParseError(format!("Invalid epoch for {}: {}", name, e)))?,
        };

        let mut pkg = Package::new(&name, &ver, &rel, &arch)
            .with_epoch(epoch)
            .with_provides(self.provides)
            .with_requires(self.requires)
            .with_requires_pre(self.requires_pre)
            .with_recommends(self.recommends);

        if arch != SOURCE_ARCH {
            match self.sourcerpm.as_deref() {
                Some(sourcerpm) if !sourcerpm.is_empty() => {
                    pkg.source_name = Some(split_rpm_filename(sourcerpm)?.name);
                }
                _ => warn!("Binary package {} has no source rpm", pkg),
            }
        }

        Ok(pkg)
    }
}

/// Parse primary.xml into packages
///
/// Malformed package entries are skipped with a warning. A document that
/// is not well-formed XML is an error.
pub fn parse_primary(xml_content: &str) -> Result<Vec<Package>> {
    let mut reader = Reader::from_str(xml_content);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    let mut current_package: Option<PackageBuilder> = None;
    let mut current_tag: Vec<u8> = Vec::new();
    let mut section = Section::None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let tag = e.local_name().as_ref().to_vec();
                match tag.as_slice() {
                    b"package" => current_package = Some(PackageBuilder::default()),
                    b"provides" => section = Section::Provides,
                    b"requires" => section = Section::Requires,
                    b"recommends" => section = Section::Recommends,
                    b"conflicts" | b"obsoletes" | b"suggests" | b"supplements"
                    | b"enhances" => section = Section::Other,
                    _ => {}
                }
                current_tag = tag;
            }
            Ok(Event::Empty(e)) => {
                if let Some(ref mut pkg) = current_package {
                    match e.local_name().as_ref() {
                        b"version" => {
                            pkg.epoch = attribute(&e, b"epoch");
                            pkg.ver = attribute(&e, b"ver");
                            pkg.rel = attribute(&e, b"rel");
                        }
                        b"entry" => pkg.entry(section, &e),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(ref mut pkg) = current_package {
                    let text = e.unescape().unwrap_or_default().to_string();
                    match current_tag.as_slice() {
                        b"name" => pkg.name = Some(text),
                        b"arch" => pkg.arch = Some(text),
                        b"sourcerpm" => pkg.sourcerpm = Some(text),
                        b"file" => pkg.provides.push(text),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"package" => {
                        if let Some(builder) = current_package.take() {
                            match builder.build() {
                                Ok(pkg) => packages.push(pkg),
                                Err(e) => warn!("Skipping package entry: {}", e),
                            }
                        }
                    }
                    b"provides" | b"requires" | b"recommends" | b"conflicts" | b"obsoletes"
                    | b"suggests" | b"supplements" | b"enhances" => section = Section::None,
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse primary.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    debug!("Parsed {} packages from primary.xml", packages.len());
    Ok(packages)
}
