// src/pkg/cataloger/rpm.rs

//! RPM package catalogers
//!
//! Two catalogers cover the RPM ecosystem:
//! - `rpm-db-cataloger` reads installed databases: `rpmdb.sqlite` through
//!   the sqlite driver, Berkeley/NDB `Packages` files through a best-effort
//!   scan for header regions (the full B-tree walk belongs to external
//!   tooling), and the container manifest used by distroless images.
//! - `rpm-archive-cataloger` reads standalone `.rpm` files (lead, signature
//!   header, main header).
//!
//! Header decoding follows the RPM header structure: an entry index over a
//! data store, big-endian throughout.

use crate::error::{Error, Result};
use crate::file::License;
use crate::hash::Digest;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{
    Language, Package, PackageType, PackageUrl, RpmArchive, RpmDbEntry, RpmFileRecord,
    PackageMetadata, QUALIFIER_ARCH, QUALIFIER_DISTRO, QUALIFIER_EPOCH, QUALIFIER_UPSTREAM,
};
use crate::linux::Release;
use std::io::{Read, Write};
use tracing::debug;

/// Globs matching every supported installed-database variant
pub const RPM_DB_GLOB: &str =
    "**/{var/lib,usr/share,usr/lib/sysimage}/rpm/{Packages,Packages.db,rpmdb.sqlite}";
/// Distroless images carry a flat manifest instead of a database
pub const RPM_MANIFEST_GLOB: &str = "**/var/lib/rpmmanifest/container-manifest-2";

/// Cataloger over installed RPM databases
pub fn db_cataloger() -> Cataloger {
    Cataloger::new("rpm-db-cataloger")
        .with_parser_by_globs(parse_rpm_db, &[RPM_DB_GLOB])
        .with_parser_by_globs(parse_rpm_manifest, &[RPM_MANIFEST_GLOB])
}

/// Cataloger over standalone `.rpm` archives
pub fn archive_cataloger() -> Cataloger {
    Cataloger::new("rpm-archive-cataloger").with_parser_by_globs(parse_rpm_archive, &["**/*.rpm"])
}

// ---------------------------------------------------------------------------
// header structure decoding

mod tag {
    pub const NAME: i32 = 1000;
    pub const VERSION: i32 = 1001;
    pub const RELEASE: i32 = 1002;
    pub const EPOCH: i32 = 1003;
    pub const SIZE: i32 = 1009;
    pub const VENDOR: i32 = 1011;
    pub const LICENSE: i32 = 1014;
    pub const ARCH: i32 = 1022;
    pub const FILESIZES: i32 = 1028;
    pub const FILEMODES: i32 = 1030;
    pub const FILEDIGESTS: i32 = 1035;
    pub const FILEFLAGS: i32 = 1037;
    pub const FILEUSERNAME: i32 = 1039;
    pub const FILEGROUPNAME: i32 = 1040;
    pub const SOURCERPM: i32 = 1044;
    pub const DIRINDEXES: i32 = 1116;
    pub const BASENAMES: i32 = 1117;
    pub const DIRNAMES: i32 = 1118;
    pub const FILEDIGESTALGO: i32 = 5011;
    pub const MODULARITYLABEL: i32 = 5096;
}

const TYPE_INT16: u32 = 3;
const TYPE_INT32: u32 = 4;
const TYPE_STRING: u32 = 6;
const TYPE_BIN: u32 = 7;
const TYPE_STRING_ARRAY: u32 = 8;
const TYPE_I18NSTRING: u32 = 9;

const HEADER_MAGIC: [u8; 4] = [0x8E, 0xAD, 0xE8, 0x01];
const LEAD_MAGIC: [u8; 4] = [0xED, 0xAB, 0xEE, 0xDB];
const LEAD_LEN: usize = 96;

#[derive(Debug)]
struct IndexEntry {
    tag: i32,
    kind: u32,
    offset: usize,
    count: usize,
}

/// A decoded header: index entries over a data store
struct Header<'a> {
    entries: Vec<IndexEntry>,
    store: &'a [u8],
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

impl<'a> Header<'a> {
    /// Parse a bare header blob (index length, store length, entries,
    /// store), as stored in databases.
    fn parse_blob(data: &'a [u8]) -> Result<Header<'a>> {
        let il = be_u32(data, 0).ok_or_else(|| malformed("truncated header"))? as usize;
        let dl = be_u32(data, 4).ok_or_else(|| malformed("truncated header"))? as usize;
        if il == 0 || il > 50_000 || dl > 256 * 1024 * 1024 {
            return Err(malformed("implausible header lengths"));
        }
        let index_end = 8 + il * 16;
        let store_end = index_end + dl;
        if data.len() < store_end {
            return Err(malformed("header extends past available data"));
        }

        let mut entries = Vec::with_capacity(il);
        for i in 0..il {
            let at = 8 + i * 16;
            let tag = be_u32(data, at).ok_or_else(|| malformed("truncated entry"))? as i32;
            let kind = be_u32(data, at + 4).ok_or_else(|| malformed("truncated entry"))?;
            let offset = be_u32(data, at + 8).ok_or_else(|| malformed("truncated entry"))? as usize;
            let count = be_u32(data, at + 12).ok_or_else(|| malformed("truncated entry"))? as usize;
            if kind > 9 || offset > dl {
                return Err(malformed("implausible index entry"));
            }
            entries.push(IndexEntry {
                tag,
                kind,
                offset,
                count,
            });
        }

        Ok(Header {
            entries,
            store: &data[index_end..store_end],
        })
    }

    /// Parse a header preceded by the 8-byte header magic.
    fn parse(data: &'a [u8]) -> Result<Header<'a>> {
        if data.len() < 8 || data[..4] != HEADER_MAGIC {
            return Err(malformed("missing header magic"));
        }
        Self::parse_blob(&data[8..])
    }

    /// Total byte length of a blob-form header (for scanning).
    fn blob_len(data: &[u8]) -> Option<usize> {
        let il = be_u32(data, 0)? as usize;
        let dl = be_u32(data, 4)? as usize;
        Some(8 + il * 16 + dl)
    }

    fn entry(&self, tag: i32) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    fn string(&self, tag: i32) -> String {
        match self.entry(tag) {
            Some(e) if e.kind == TYPE_STRING || e.kind == TYPE_I18NSTRING => {
                read_nul_string(self.store, e.offset)
            }
            _ => String::new(),
        }
    }

    fn string_array(&self, tag: i32) -> Vec<String> {
        let Some(e) = self.entry(tag) else {
            return Vec::new();
        };
        if e.kind != TYPE_STRING_ARRAY && e.kind != TYPE_I18NSTRING {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(e.count);
        let mut at = e.offset;
        for _ in 0..e.count {
            let s = read_nul_string(self.store, at);
            at += s.len() + 1;
            out.push(s);
        }
        out
    }

    fn int32_array(&self, tag: i32) -> Vec<i32> {
        let Some(e) = self.entry(tag) else {
            return Vec::new();
        };
        if e.kind != TYPE_INT32 {
            return Vec::new();
        }
        (0..e.count)
            .filter_map(|i| be_u32(self.store, e.offset + i * 4).map(|v| v as i32))
            .collect()
    }

    fn int16_array(&self, tag: i32) -> Vec<u16> {
        let Some(e) = self.entry(tag) else {
            return Vec::new();
        };
        if e.kind != TYPE_INT16 {
            return Vec::new();
        }
        (0..e.count)
            .filter_map(|i| {
                self.store
                    .get(e.offset + i * 2..e.offset + i * 2 + 2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
            })
            .collect()
    }

    fn int32(&self, tag: i32) -> Option<i32> {
        self.int32_array(tag).first().copied()
    }
}

fn malformed(reason: &str) -> Error {
    Error::Parse {
        path: String::new(),
        reason: reason.to_string(),
    }
}

fn read_nul_string(store: &[u8], at: usize) -> String {
    let slice = match store.get(at..) {
        Some(s) => s,
        None => return String::new(),
    };
    let end = slice.iter().position(|b| *b == 0).unwrap_or(slice.len());
    String::from_utf8_lossy(&slice[..end]).into_owned()
}

/// Assemble a database entry from a decoded header.
fn entry_from_header(header: &Header) -> Option<RpmDbEntry> {
    let name = header.string(tag::NAME);
    if name.is_empty() {
        return None;
    }

    let dir_names = header.string_array(tag::DIRNAMES);
    let dir_indexes = header.int32_array(tag::DIRINDEXES);
    let base_names = header.string_array(tag::BASENAMES);
    let modes = header.int16_array(tag::FILEMODES);
    let sizes = header.int32_array(tag::FILESIZES);
    let digests = header.string_array(tag::FILEDIGESTS);
    let users = header.string_array(tag::FILEUSERNAME);
    let groups = header.string_array(tag::FILEGROUPNAME);
    let flags = header.int32_array(tag::FILEFLAGS);
    let digest_algorithm = match header.int32(tag::FILEDIGESTALGO) {
        Some(8) => "sha256",
        Some(9) => "sha384",
        Some(10) => "sha512",
        _ => "md5",
    };

    let mut files = Vec::with_capacity(base_names.len());
    for (i, base) in base_names.iter().enumerate() {
        let dir = dir_indexes
            .get(i)
            .and_then(|idx| dir_names.get(*idx as usize))
            .cloned()
            .unwrap_or_default();
        let digest = digests.get(i).filter(|d| !d.is_empty()).map(|d| Digest {
            algorithm: digest_algorithm.to_string(),
            value: d.clone(),
        });
        files.push(RpmFileRecord {
            path: format!("{}{}", dir, base),
            mode: modes.get(i).copied().unwrap_or(0) as u32,
            size: sizes.get(i).copied().unwrap_or(0) as i64,
            digest,
            user_name: users.get(i).cloned().unwrap_or_default(),
            group_name: groups.get(i).cloned().unwrap_or_default(),
            flags: flags
                .get(i)
                .map(|f| f.to_string())
                .unwrap_or_default(),
        });
    }

    Some(RpmDbEntry {
        name,
        version: header.string(tag::VERSION),
        epoch: header.int32(tag::EPOCH),
        arch: header.string(tag::ARCH),
        release: header.string(tag::RELEASE),
        source_rpm: header.string(tag::SOURCERPM),
        size: header.int32(tag::SIZE).unwrap_or(0) as i64,
        vendor: header.string(tag::VENDOR),
        modularity_label: {
            let label = header.string(tag::MODULARITYLABEL);
            if label.is_empty() {
                None
            } else {
                Some(label)
            }
        },
        files,
    })
}

// ---------------------------------------------------------------------------
// database parsing

fn parse_rpm_db(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    let base_name = ctx
        .location
        .real_path()
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let entries = if base_name == "rpmdb.sqlite" {
        read_sqlite_db(&data, ctx)?
    } else {
        scan_header_blobs(&data)
    };

    let mut packages = Vec::new();
    let mut licenses_seen = 0usize;
    for (entry, license) in entries {
        licenses_seen += usize::from(!license.is_empty());
        packages.push(db_package(entry, license, ctx));
    }
    debug!(
        path = ctx.location.real_path(),
        packages = packages.len(),
        with_license = licenses_seen,
        "cataloged rpm database"
    );
    Ok((packages, Vec::new()))
}

/// Read `rpmdb.sqlite` through the sqlite driver (the database arrives as a
/// stream, so it lands in a scratch file first).
fn read_sqlite_db(data: &[u8], ctx: &ParseContext) -> Result<Vec<(RpmDbEntry, String)>> {
    let mut scratch = tempfile::NamedTempFile::new()?;
    scratch.write_all(data)?;
    scratch.flush()?;

    let connection = rusqlite::Connection::open_with_flags(
        scratch.path(),
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .map_err(|e| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: format!("unable to open rpm sqlite database: {}", e),
    })?;

    let mut statement = connection
        .prepare("SELECT blob FROM Packages")
        .map_err(|e| Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: format!("unexpected rpm sqlite schema: {}", e),
        })?;

    let mut out = Vec::new();
    let mut rows = statement.query([]).map_err(|e| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: e.to_string(),
    })?;
    while let Some(row) = rows.next().map_err(|e| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: e.to_string(),
    })? {
        let blob: Vec<u8> = match row.get(0) {
            Ok(blob) => blob,
            Err(e) => {
                debug!(error = %e, "skipping unreadable package row");
                continue;
            }
        };
        match Header::parse_blob(&blob) {
            Ok(header) => {
                if let Some(entry) = entry_from_header(&header) {
                    let license = header.string(tag::LICENSE);
                    out.push((entry, license));
                }
            }
            Err(e) => debug!(error = %e, "skipping undecodable package header"),
        }
    }
    Ok(out)
}

/// Best-effort scan of a Berkeley/NDB database file for header blobs.
///
/// The page structure is not walked; instead every offset that looks like a
/// header blob whose first index entry is a region marker is decoded. Flat
/// databases and databases whose blobs are page-contiguous are recovered.
fn scan_header_blobs(data: &[u8]) -> Vec<(RpmDbEntry, String)> {
    let mut out = Vec::new();
    let mut at = 0usize;

    while at + 24 <= data.len() {
        if !looks_like_header_blob(&data[at..]) {
            at += 1;
            continue;
        }
        match Header::parse_blob(&data[at..]) {
            Ok(header) => {
                if let Some(entry) = entry_from_header(&header) {
                    let license = header.string(tag::LICENSE);
                    let advance = Header::blob_len(&data[at..]).unwrap_or(1);
                    out.push((entry, license));
                    at += advance;
                    continue;
                }
                at += 1;
            }
            Err(_) => at += 1,
        }
    }
    out
}

/// A header blob begins with plausible lengths and a region entry
/// (HEADERIMMUTABLE family, BIN type) as its first index entry.
fn looks_like_header_blob(data: &[u8]) -> bool {
    let Some(il) = be_u32(data, 0) else {
        return false;
    };
    let Some(dl) = be_u32(data, 4) else {
        return false;
    };
    if il == 0 || il > 10_000 || dl < 16 || dl > 64 * 1024 * 1024 {
        return false;
    }
    let Some(first_tag) = be_u32(data, 8) else {
        return false;
    };
    let Some(first_kind) = be_u32(data, 12) else {
        return false;
    };
    (61..=64).contains(&first_tag) && first_kind == TYPE_BIN
}

fn parse_rpm_manifest(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut packages = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match manifest_entry(line) {
            Ok(entry) => packages.push(db_package(entry, String::new(), ctx)),
            Err(e) => {
                return Err(Error::Parse {
                    path: ctx.location.real_path().to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
    Ok((packages, Vec::new()))
}

/// One tab-separated line of `container-manifest-2`.
fn manifest_entry(line: &str) -> Result<RpmDbEntry> {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 10 {
        return Err(malformed("unexpected number of manifest fields"));
    }

    let (version, release) = parts[1]
        .split_once('-')
        .ok_or_else(|| malformed("unexpected manifest version field"))?;

    let epoch = match parts[5] {
        "(none)" | "" => None,
        raw => raw.parse::<i32>().ok(),
    };

    Ok(RpmDbEntry {
        name: parts[0].to_string(),
        version: version.to_string(),
        epoch,
        arch: parts[7].to_string(),
        release: release.to_string(),
        source_rpm: parts[9].to_string(),
        size: parts[6].parse().unwrap_or(0),
        vendor: parts[4].to_string(),
        ..Default::default()
    })
}

// ---------------------------------------------------------------------------
// archive parsing

fn parse_rpm_archive(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    if data.len() < LEAD_LEN || data[..4] != LEAD_MAGIC {
        return Err(Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: "not an rpm archive (lead magic mismatch)".to_string(),
        });
    }

    // the signature header follows the lead, padded to an 8-byte boundary
    let sig = Header::parse(&data[LEAD_LEN..]).map_err(|_| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: "malformed signature header".to_string(),
    })?;
    let sig_blob_len = Header::blob_len(&data[LEAD_LEN + 8..]).unwrap_or(0);
    drop(sig);
    let mut main_at = LEAD_LEN + 8 + sig_blob_len;
    main_at += (8 - main_at % 8) % 8;

    let header = Header::parse(&data[main_at..]).map_err(|_| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: "malformed package header".to_string(),
    })?;

    let entry = entry_from_header(&header).ok_or_else(|| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: "package header carries no name".to_string(),
    })?;
    let license = header.string(tag::LICENSE);

    // archives are declared content; no installed distro context applies
    let purl = rpm_purl(&entry, None);
    let mut package = Package {
        name: entry.name.clone(),
        version: entry.el_version(),
        package_type: PackageType::Rpm,
        language: Language::None,
        purl,
        metadata: Some(PackageMetadata::RpmArchive(RpmArchive(entry))),
        ..Default::default()
    };
    if !license.is_empty() {
        package.licenses.add(License::from_value(license));
    }
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());

    Ok((vec![package], Vec::new()))
}

// ---------------------------------------------------------------------------
// package construction

fn db_package(entry: RpmDbEntry, license: String, ctx: &ParseContext) -> Package {
    let purl = rpm_purl(&entry, ctx.release);
    let mut package = Package {
        name: entry.name.clone(),
        version: entry.el_version(),
        package_type: PackageType::Rpm,
        language: Language::None,
        purl,
        metadata: Some(PackageMetadata::RpmDbEntry(entry)),
        ..Default::default()
    };
    if !license.is_empty() {
        package.licenses.add(License::from_value(license));
    }
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());
    package
}

/// `pkg:rpm/<distro>/<name>@<version>-<release>` with arch, epoch, upstream
/// and distro qualifiers. The epoch is a qualifier, not part of the version.
fn rpm_purl(entry: &RpmDbEntry, release: Option<&Release>) -> String {
    let namespace = release.map(|r| r.id.as_str()).unwrap_or_default();
    let version = if entry.release.is_empty() {
        entry.version.clone()
    } else {
        format!("{}-{}", entry.version, entry.release)
    };

    let mut purl = PackageUrl::new("rpm", &entry.name)
        .with_namespace(namespace)
        .with_version(&version)
        .with_qualifier(QUALIFIER_ARCH, &entry.arch)
        .with_qualifier(QUALIFIER_UPSTREAM, &entry.source_rpm);
    if let Some(epoch) = entry.epoch {
        purl = purl.with_qualifier(QUALIFIER_EPOCH, &epoch.to_string());
    }
    if let Some(distro) = release.and_then(|r| r.distro_qualifier()) {
        purl = purl.with_qualifier(QUALIFIER_DISTRO, &distro);
    }
    purl.to_string()
}
