// src/pkg/cataloger/alpm.rs

//! pacman local-database cataloger
//!
//! Each installed package owns a directory under `var/lib/pacman/local/`
//! holding a `desc` file of `%SECTION%` blocks and a `files` list. The
//! cataloger claims `desc` and pulls the sibling `files` through the
//! resolver.

use crate::file::License;
use crate::linux::Release;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{
    AlpmDbEntry, AlpmFileRecord, Language, Package, PackageMetadata, PackageType, PackageUrl,
    QUALIFIER_ARCH, QUALIFIER_DISTRO,
};
use std::collections::HashMap;
use std::io::Read;

/// Cataloger over the pacman local database
pub fn db_cataloger() -> Cataloger {
    Cataloger::new("alpm-db-cataloger")
        .with_parser_by_globs(parse_desc, &["**/var/lib/pacman/local/**/desc"])
}

fn parse_desc(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let sections = parse_sections(&content);
    let name = sections.get("NAME").and_then(|v| v.first()).cloned();
    let version = sections.get("VERSION").and_then(|v| v.first()).cloned();
    let (Some(name), Some(version)) = (name, version) else {
        return Err(crate::error::Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: "desc is missing %NAME% or %VERSION%".to_string(),
        });
    };

    let single = |key: &str| -> String {
        sections
            .get(key)
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_default()
    };

    let entry = AlpmDbEntry {
        base_package: single("BASE"),
        package: name.clone(),
        version: version.clone(),
        description: single("DESC"),
        architecture: single("ARCH"),
        size: single("SIZE").parse().unwrap_or(0),
        packager: single("PACKAGER"),
        url: single("URL"),
        validation: single("VALIDATION"),
        files: owned_files(ctx),
        backup: sections.get("BACKUP").cloned().unwrap_or_default(),
    };

    let mut package = Package {
        name,
        version,
        package_type: PackageType::Alpm,
        language: Language::None,
        purl: alpm_purl(&entry, ctx.release),
        ..Default::default()
    };
    for license in sections.get("LICENSE").into_iter().flatten() {
        package.licenses.add(License::from_value(license.clone()));
    }
    package.metadata = Some(PackageMetadata::AlpmDbEntry(entry));
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());

    Ok((vec![package], Vec::new()))
}

/// Split a desc file into its `%SECTION%` blocks.
fn parse_sections(content: &str) -> HashMap<String, Vec<String>> {
    let mut sections: HashMap<String, Vec<String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('%') && line.ends_with('%') && line.len() > 2 {
            current = Some(line.trim_matches('%').to_string());
            continue;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(section) = &current {
            sections
                .entry(section.clone())
                .or_default()
                .push(line.to_string());
        }
    }
    sections
}

/// The sibling `files` list, also `%SECTION%` formatted, holds the
/// installed paths (relative to the filesystem root).
fn owned_files(ctx: &ParseContext) -> Vec<AlpmFileRecord> {
    let files_path = format!(
        "{}/files",
        ctx.location.real_path().trim_end_matches("/desc")
    );
    let Some(location) = ctx.resolver.relative_file_by_path(ctx.location, &files_path) else {
        return Vec::new();
    };
    let Ok(mut reader) = ctx.resolver.file_contents_by_location(&location) else {
        return Vec::new();
    };
    let mut content = String::new();
    if reader.read_to_string(&mut content).is_err() {
        return Vec::new();
    }

    parse_sections(&content)
        .remove("FILES")
        .unwrap_or_default()
        .into_iter()
        .filter(|p| !p.ends_with('/'))
        .map(|p| AlpmFileRecord {
            path: format!("/{}", p.trim_start_matches('/')),
        })
        .collect()
}

fn alpm_purl(entry: &AlpmDbEntry, release: Option<&Release>) -> String {
    let namespace = release.map(|r| r.id.as_str()).unwrap_or("arch");
    let mut purl = PackageUrl::new("alpm", &entry.package)
        .with_namespace(namespace)
        .with_version(&entry.version)
        .with_qualifier(QUALIFIER_ARCH, &entry.architecture);
    if let Some(distro) = release.and_then(|r| r.distro_qualifier()) {
        purl = purl.with_qualifier(QUALIFIER_DISTRO, &distro);
    }
    purl.to_string()
}
