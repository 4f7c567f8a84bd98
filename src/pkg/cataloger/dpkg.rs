// src/pkg/cataloger/dpkg.rs

//! dpkg status-database cataloger
//!
//! Parses the RFC822-style stanzas of `/var/lib/dpkg/status`. Owned files
//! and their digests come from the sibling `info/<package>.list` and
//! `info/<package>.md5sums` files, resolved relative to the status file so
//! layered sources look them up in the correct squash.

use crate::file::License;
use crate::hash::Digest;
use crate::linux::Release;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::artifact::{Relationship, RelationshipNode, RelationshipType};
use crate::pkg::{
    DpkgDbEntry, DpkgFileRecord, Language, Package, PackageMetadata, PackageType, PackageUrl,
    QUALIFIER_ARCH, QUALIFIER_DISTRO,
};
use std::collections::HashMap;
use std::io::Read;

/// Cataloger over the dpkg status database
pub fn db_cataloger() -> Cataloger {
    Cataloger::new("dpkg-db-cataloger")
        .with_parser_by_globs(parse_status, &["**/var/lib/dpkg/status", "**/lib/dpkg/status"])
}

fn parse_status(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut packages = Vec::new();
    for stanza in content.split("\n\n") {
        if stanza.trim().is_empty() {
            continue;
        }
        let fields = parse_stanza(stanza);
        let Some(name) = fields.get("Package") else {
            continue;
        };
        // only positively installed packages are cataloged
        if let Some(status) = fields.get("Status") {
            if !status.contains("installed") {
                continue;
            }
        }
        let version = fields.get("Version").cloned().unwrap_or_default();
        if version.is_empty() {
            continue;
        }

        let architecture = fields.get("Architecture").cloned().unwrap_or_default();
        let (source, source_version) = split_source(fields.get("Source").map(String::as_str));

        let mut entry = DpkgDbEntry {
            package: name.clone(),
            source,
            version: version.clone(),
            source_version,
            architecture: architecture.clone(),
            maintainer: fields.get("Maintainer").cloned().unwrap_or_default(),
            installed_size: fields
                .get("Installed-Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            description: first_line(fields.get("Description")),
            provides: split_dependency_list(fields.get("Provides")),
            depends: split_dependency_list(fields.get("Depends")),
            pre_depends: split_dependency_list(fields.get("Pre-Depends")),
            files: Vec::new(),
        };
        entry.files = owned_file_records(ctx, name, &architecture);

        let mut package = Package {
            name: name.clone(),
            version,
            package_type: PackageType::Deb,
            language: Language::None,
            purl: deb_purl(&entry, ctx.release),
            metadata: None,
            ..Default::default()
        };
        if let Some(license) = fields.get("License") {
            package.licenses.add(License::from_value(license.clone()));
        }
        package.metadata = Some(PackageMetadata::DpkgDbEntry(entry));
        package
            .locations
            .add(ctx.location.clone().with_primary_evidence());
        packages.push(package);
    }

    let relationships = dependency_relationships(&mut packages);
    Ok((packages, relationships))
}

/// Fold continuation lines and split `Key: value` pairs.
fn parse_stanza(stanza: &str) -> HashMap<String, String> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in stanza.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(key) = &current {
                let entry = fields.entry(key.clone()).or_default();
                entry.push('\n');
                entry.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
            current = Some(key.trim().to_string());
        }
    }
    fields
}

/// `Source` may carry a pinned version: `src (1.2-3)`.
fn split_source(raw: Option<&str>) -> (String, String) {
    let Some(raw) = raw else {
        return (String::new(), String::new());
    };
    match raw.split_once('(') {
        Some((name, version)) => (
            name.trim().to_string(),
            version.trim_end_matches(')').trim().to_string(),
        ),
        None => (raw.trim().to_string(), String::new()),
    }
}

fn first_line(value: Option<&String>) -> String {
    value
        .map(|v| v.lines().next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

/// Dependency fields list alternatives and version constraints; only the
/// package names are retained.
fn split_dependency_list(raw: Option<&String>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.split(',')
        .flat_map(|clause| clause.split('|'))
        .map(|candidate| {
            candidate
                .trim()
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .split(':')
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Read `info/<name>.list` and `info/<name>.md5sums` relative to the
/// status file.
fn owned_file_records(ctx: &ParseContext, name: &str, architecture: &str) -> Vec<DpkgFileRecord> {
    let info_dir = format!(
        "{}/info",
        ctx.location
            .real_path()
            .trim_end_matches("/status")
    );

    let candidates = [
        format!("{}/{}:{}.list", info_dir, name, architecture),
        format!("{}/{}.list", info_dir, name),
    ];
    let mut paths: Vec<String> = Vec::new();
    for candidate in &candidates {
        if let Some(location) = ctx.resolver.relative_file_by_path(ctx.location, candidate) {
            if let Ok(mut reader) = ctx.resolver.file_contents_by_location(&location) {
                let mut content = String::new();
                if reader.read_to_string(&mut content).is_ok() {
                    paths = content
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && *l != "/.")
                        .map(str::to_string)
                        .collect();
                }
            }
            break;
        }
    }

    let mut digests: HashMap<String, Digest> = HashMap::new();
    let md5_candidates = [
        format!("{}/{}:{}.md5sums", info_dir, name, architecture),
        format!("{}/{}.md5sums", info_dir, name),
    ];
    for candidate in &md5_candidates {
        if let Some(location) = ctx.resolver.relative_file_by_path(ctx.location, candidate) {
            if let Ok(mut reader) = ctx.resolver.file_contents_by_location(&location) {
                let mut content = String::new();
                if reader.read_to_string(&mut content).is_ok() {
                    for line in content.lines() {
                        if let Some((digest, path)) = line.trim().split_once("  ") {
                            digests.insert(
                                format!("/{}", path.trim()),
                                Digest::new("md5", digest.trim()),
                            );
                        }
                    }
                }
            }
            break;
        }
    }

    paths
        .into_iter()
        .map(|path| {
            let digest = digests.remove(&path);
            DpkgFileRecord { path, digest }
        })
        .collect()
}

/// Edges between packages discovered in the same status file:
/// `B dependency-of A` when A depends on B.
fn dependency_relationships(packages: &mut [Package]) -> Vec<Relationship> {
    for package in packages.iter_mut() {
        package.set_id();
    }
    let by_name: HashMap<String, &Package> = packages
        .iter()
        .map(|p| (p.name.clone(), &*p))
        .collect();

    let mut relationships = Vec::new();
    for package in packages.iter() {
        let Some(PackageMetadata::DpkgDbEntry(entry)) = &package.metadata else {
            continue;
        };
        for dependency in entry.depends.iter().chain(entry.pre_depends.iter()) {
            if let Some(provider) = by_name.get(dependency) {
                if provider.id() != package.id() {
                    relationships.push(Relationship::new(
                        RelationshipNode::package(provider.id().clone()),
                        RelationshipNode::package(package.id().clone()),
                        RelationshipType::DependencyOf,
                    ));
                }
            }
        }
    }
    relationships
}

fn deb_purl(entry: &DpkgDbEntry, release: Option<&Release>) -> String {
    let namespace = release.map(|r| r.id.as_str()).unwrap_or_default();
    let mut purl = PackageUrl::new("deb", &entry.package)
        .with_namespace(namespace)
        .with_version(&entry.version)
        .with_qualifier(QUALIFIER_ARCH, &entry.architecture);
    if let Some(distro) = release.and_then(|r| r.distro_qualifier()) {
        purl = purl.with_qualifier(QUALIFIER_DISTRO, &distro);
    }
    purl.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::event::TaskProgress;
    use crate::source::MemoryResolver;

    const STATUS: &str = "\
Package: bash
Status: install ok installed
Version: 5.2.15-2+b2
Architecture: amd64
Maintainer: Matthias Klose <doko@debian.org>
Installed-Size: 6470
Depends: base-files, debianutils (>= 5.6-0.1)
Description: GNU Bourne Again SHell
 Bash is an sh-compatible command language interpreter.

Package: base-files
Status: install ok installed
Version: 12.4+deb12u5
Architecture: amd64
Description: Debian base system miscellaneous files

Package: removed-tool
Status: deinstall ok config-files
Version: 1.0
Architecture: amd64
";

    fn fixture() -> MemoryResolver {
        MemoryResolver::new()
            .with_file("/var/lib/dpkg/status", STATUS.as_bytes())
            .with_file(
                "/var/lib/dpkg/info/bash.list",
                b"/.\n/bin/bash\n/usr/share/man/man1/bash.1.gz\n",
            )
            .with_file(
                "/var/lib/dpkg/info/bash.md5sums",
                b"0f48d2e64a0c26b1e6f6532638b6bb64  bin/bash\n",
            )
    }

    fn run(resolver: &MemoryResolver) -> (Vec<Package>, Vec<Relationship>) {
        let token = CancelToken::new();
        let progress = TaskProgress::new(0);
        let batch = db_cataloger()
            .catalog(resolver, None, &token, &progress)
            .unwrap();
        assert!(batch.failures.is_empty());
        (batch.packages, batch.relationships)
    }

    #[test]
    fn test_installed_stanzas_become_packages() {
        let (packages, _) = run(&fixture());
        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["bash", "base-files"]);
        assert_eq!(packages[0].purl, "pkg:deb/bash@5.2.15-2%2Bb2?arch=amd64");
    }

    #[test]
    fn test_owned_files_and_digests() {
        let (packages, _) = run(&fixture());
        let bash = &packages[0];
        assert_eq!(
            bash.owned_files(),
            vec!["/bin/bash", "/usr/share/man/man1/bash.1.gz"]
        );
        let Some(PackageMetadata::DpkgDbEntry(entry)) = &bash.metadata else {
            panic!("wrong metadata variant");
        };
        let with_digest = entry
            .files
            .iter()
            .find(|f| f.path == "/bin/bash")
            .unwrap();
        assert_eq!(with_digest.digest.as_ref().unwrap().algorithm, "md5");
    }

    #[test]
    fn test_dependency_edges_within_status_file() {
        let (packages, relationships) = run(&fixture());
        let bash = packages.iter().find(|p| p.name == "bash").unwrap();
        let base = packages.iter().find(|p| p.name == "base-files").unwrap();

        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationshipType::DependencyOf);
        assert_eq!(
            relationships[0].from.package_id().unwrap(),
            base.id()
        );
        assert_eq!(relationships[0].to.package_id().unwrap(), bash.id());
    }

    #[test]
    fn test_deinstalled_packages_skipped() {
        let (packages, _) = run(&fixture());
        assert!(!packages.iter().any(|p| p.name == "removed-tool"));
    }
}
