// src/pkg/cataloger/python.rs

//! python installed-distribution cataloger (`*.dist-info`)
//!
//! METADATA carries the core fields (RFC822 headers); RECORD lists the
//! installed files with their digests, relative to site-packages.

use crate::file::License;
use crate::hash::Digest;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{
    Language, Package, PackageMetadata, PackageType, PackageUrl, PythonFileRecord, PythonPackage,
};
use std::io::Read;

/// Cataloger over installed python distributions
pub fn installed_cataloger() -> Cataloger {
    Cataloger::new("python-installed-package-cataloger")
        .with_parser_by_globs(parse_dist_info, &["**/*.dist-info/METADATA"])
}

fn parse_dist_info(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;

    let mut name = String::new();
    let mut version = String::new();
    let mut author = String::new();
    let mut author_email = String::new();
    let mut platform = String::new();
    let mut license = String::new();

    // headers end at the first blank line (the long description follows)
    for line in content.lines() {
        if line.trim().is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => name = value.to_string(),
            "Version" => version = value.to_string(),
            "Author" => author = value.to_string(),
            "Author-email" => author_email = value.to_string(),
            "Platform" => platform = value.to_string(),
            "License" => license = value.to_string(),
            _ => {}
        }
    }

    if name.is_empty() || version.is_empty() {
        return Err(crate::error::Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: "METADATA is missing Name or Version".to_string(),
        });
    }

    let dist_info_dir = ctx
        .location
        .real_path()
        .trim_end_matches("/METADATA")
        .to_string();
    let site_packages = dist_info_dir
        .rsplit_once('/')
        .map(|(parent, _)| parent.to_string())
        .unwrap_or_default();

    let metadata = PythonPackage {
        name: name.clone(),
        version: version.clone(),
        author,
        author_email,
        platform,
        site_packages_root_path: site_packages,
        files: record_files(ctx, &dist_info_dir),
    };

    let mut package = Package {
        name: name.clone(),
        version: version.clone(),
        package_type: PackageType::Python,
        language: Language::Python,
        purl: pypi_purl(&name, &version),
        metadata: Some(PackageMetadata::PythonPackage(metadata)),
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

/// RECORD rows: `path,algorithm=base64digest,size`.
fn record_files(ctx: &ParseContext, dist_info_dir: &str) -> Vec<PythonFileRecord> {
    let record_path = format!("{}/RECORD", dist_info_dir);
    let Some(location) = ctx.resolver.relative_file_by_path(ctx.location, &record_path) else {
        return Vec::new();
    };
    let Ok(mut reader) = ctx.resolver.file_contents_by_location(&location) else {
        return Vec::new();
    };
    let mut content = String::new();
    if reader.read_to_string(&mut content).is_err() {
        return Vec::new();
    }

    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, ',');
            let path = parts.next()?.trim();
            if path.is_empty() {
                return None;
            }
            let digest = parts.next().and_then(|raw| {
                let (algorithm, value) = raw.split_once('=')?;
                if value.is_empty() {
                    return None;
                }
                Some(Digest::new(algorithm, value))
            });
            let size = parts.next().unwrap_or_default().trim().to_string();
            Some(PythonFileRecord {
                path: path.to_string(),
                digest,
                size,
            })
        })
        .collect()
}

/// Normalized per the pypi rules: lowercase, underscores and dots to dashes.
fn pypi_purl(name: &str, version: &str) -> String {
    let normalized = name.to_lowercase().replace(['_', '.'], "-");
    PackageUrl::new("pypi", &normalized)
        .with_version(version)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::event::TaskProgress;
    use crate::source::MemoryResolver;

    const METADATA: &str = "\
Metadata-Version: 2.1
Name: requests
Version: 2.31.0
Author: Kenneth Reitz
Author-email: me@kennethreitz.org
License: Apache-2.0

Requests is a simple HTTP library.
Name: should-not-be-read
";

    const RECORD: &str = "\
requests/__init__.py,sha256=6KVyzLkVyCbpKmwH,5178
requests/api.py,sha256=q61xcVyTzw9qrk,6449
requests-2.31.0.dist-info/METADATA,,
";

    #[test]
    fn test_dist_info_parse() {
        let root = "/usr/lib/python3.11/site-packages";
        let resolver = MemoryResolver::new()
            .with_file(
                &format!("{}/requests-2.31.0.dist-info/METADATA", root),
                METADATA.as_bytes(),
            )
            .with_file(
                &format!("{}/requests-2.31.0.dist-info/RECORD", root),
                RECORD.as_bytes(),
            );

        let token = CancelToken::new();
        let progress = TaskProgress::new(0);
        let batch = installed_cataloger()
            .catalog(&resolver, None, &token, &progress)
            .unwrap();

        assert_eq!(batch.packages.len(), 1);
        let package = &batch.packages[0];
        assert_eq!(package.name, "requests");
        assert_eq!(package.version, "2.31.0");
        assert_eq!(package.purl, "pkg:pypi/requests@2.31.0");
        assert_eq!(package.language, Language::Python);

        // RECORD paths resolve against site-packages
        let owned = package.owned_files();
        assert!(owned.contains(&format!("{}/requests/api.py", root)));
    }

    #[test]
    fn test_headers_stop_at_blank_line() {
        let resolver = MemoryResolver::new().with_file(
            "/site-packages/x-1.0.dist-info/METADATA",
            METADATA.as_bytes(),
        );

        let token = CancelToken::new();
        let progress = TaskProgress::new(0);
        let batch = installed_cataloger()
            .catalog(&resolver, None, &token, &progress)
            .unwrap();
        assert_eq!(batch.packages[0].name, "requests");
    }

    #[test]
    fn test_underscored_name_normalized_in_purl() {
        assert_eq!(
            pypi_purl("Typing_Extensions", "4.9.0"),
            "pkg:pypi/typing-extensions@4.9.0"
        );
    }
}
