// src/pkg/cataloger/java.rs

//! java archive cataloger (jar/war/ear)
//!
//! Archives are spooled to a scratch file and opened through the crate's
//! offset-tolerant ZIP reader, so self-extracting jars with a shell prefix
//! are handled the same as plain ones. Identity is taken from
//! `pom.properties` when present, with `META-INF/MANIFEST.MF` as the
//! fallback.

use crate::archive::ZipArchive;
use crate::error::Error;
use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{
    JavaArchive, Language, Package, PackageMetadata, PackageType, PackageUrl, PomProperties,
};
use std::io::{Read, Write};

/// Cataloger over java archives
pub fn archive_cataloger() -> Cataloger {
    Cataloger::new("java-archive-cataloger")
        .with_parser_by_globs(parse_java_archive, &["**/*.jar", "**/*.war", "**/*.ear"])
}

fn parse_java_archive(reader: &mut (dyn Read + Send), ctx: &ParseContext) -> ParseOutcome {
    let mut scratch = tempfile::NamedTempFile::new()?;
    std::io::copy(reader, &mut scratch)?;
    scratch.flush()?;

    let archive = ZipArchive::open(scratch.path()).map_err(|e| Error::Parse {
        path: ctx.location.real_path().to_string(),
        reason: format!("unreadable java archive: {}", e),
    })?;

    let manifest = archive
        .read("META-INF/MANIFEST.MF")
        .ok()
        .map(|bytes| parse_manifest(&bytes))
        .unwrap_or_default();

    let pom_properties = archive
        .entries()
        .iter()
        .find(|e| e.name.ends_with("pom.properties"))
        .map(|e| e.name.clone())
        .and_then(|name| archive.read(&name).ok())
        .map(|bytes| parse_pom_properties(&bytes));

    let manifest_value = |key: &str| -> String {
        manifest
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    let file_name = ctx
        .location
        .real_path()
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);

    let (name, version, group) = match &pom_properties {
        Some(pom) if !pom.artifact_id.is_empty() => (
            pom.artifact_id.clone(),
            pom.version.clone(),
            pom.group_id.clone(),
        ),
        _ => {
            let name = manifest_value("Implementation-Title");
            let version = manifest_value("Implementation-Version");
            let (fallback_name, fallback_version) = split_name_version(stem);
            (
                if name.is_empty() { fallback_name } else { name },
                if version.is_empty() {
                    fallback_version
                } else {
                    version
                },
                manifest_value("Implementation-Vendor-Id"),
            )
        }
    };

    if name.is_empty() {
        return Err(Error::Parse {
            path: ctx.location.real_path().to_string(),
            reason: "archive carries no identifiable name".to_string(),
        });
    }

    let metadata = JavaArchive {
        virtual_path: ctx.location.real_path().to_string(),
        manifest,
        pom_properties,
    };

    let namespace = if group.is_empty() { &name } else { &group };
    let mut package = Package {
        name: name.clone(),
        version: version.clone(),
        package_type: PackageType::JavaArchive,
        language: Language::Java,
        purl: PackageUrl::new("maven", &name)
            .with_namespace(namespace)
            .with_version(&version)
            .to_string(),
        metadata: Some(PackageMetadata::JavaArchive(metadata)),
        ..Default::default()
    };
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());

    Ok((vec![package], Vec::new()))
}

/// MANIFEST.MF keys, with 72-byte continuation lines folded.
fn parse_manifest(bytes: &[u8]) -> Vec<(String, String)> {
    let content = String::from_utf8_lossy(bytes);
    let mut out: Vec<(String, String)> = Vec::new();

    for line in content.lines() {
        if let Some(continuation) = line.strip_prefix(' ') {
            if let Some((_, value)) = out.last_mut() {
                value.push_str(continuation);
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            out.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
    out
}

fn parse_pom_properties(bytes: &[u8]) -> PomProperties {
    let content = String::from_utf8_lossy(bytes);
    let mut pom = PomProperties::default();
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "groupId" => pom.group_id = value.trim().to_string(),
                "artifactId" => pom.artifact_id = value.trim().to_string(),
                "version" => pom.version = value.trim().to_string(),
                _ => {}
            }
        }
    }
    pom
}

/// `demo-app-1.4.2` splits at the last dash followed by a digit.
fn split_name_version(stem: &str) -> (String, String) {
    for (at, _) in stem.match_indices('-') {
        let candidate = &stem[at + 1..];
        if candidate.chars().next().map(|c| c.is_ascii_digit()) == Some(true) {
            return (stem[..at].to_string(), candidate.to_string());
        }
    }
    (stem.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::zip::test_support::{build_zip, FixtureEntry};
    use crate::cancel::CancelToken;
    use crate::event::TaskProgress;
    use crate::source::MemoryResolver;

    fn jar_bytes(prepend: usize) -> Vec<u8> {
        build_zip(
            &[
                FixtureEntry {
                    name: "META-INF/MANIFEST.MF",
                    data: b"Manifest-Version: 1.0\nImplementation-Title: demo-app\nImplementation-Version: 1.4.2\n".to_vec(),
                    deflate: false,
                },
                FixtureEntry {
                    name: "META-INF/maven/com.acme/demo-app/pom.properties",
                    data: b"#generated\ngroupId=com.acme\nartifactId=demo-app\nversion=1.4.2\n".to_vec(),
                    deflate: true,
                },
            ],
            prepend,
        )
    }

    fn run(resolver: &MemoryResolver) -> Vec<Package> {
        let token = CancelToken::new();
        let progress = TaskProgress::new(0);
        let batch = archive_cataloger()
            .catalog(resolver, None, &token, &progress)
            .unwrap();
        assert!(batch.failures.is_empty(), "{:?}", batch.failures);
        batch.packages
    }

    #[test]
    fn test_pom_properties_win_over_manifest() {
        let resolver = MemoryResolver::new().with_file("/opt/app/demo-app-1.4.2.jar", &jar_bytes(0));
        let packages = run(&resolver);

        assert_eq!(packages.len(), 1);
        let package = &packages[0];
        assert_eq!(package.name, "demo-app");
        assert_eq!(package.version, "1.4.2");
        assert_eq!(package.purl, "pkg:maven/com.acme/demo-app@1.4.2");
        assert_eq!(package.language, Language::Java);
    }

    #[test]
    fn test_self_extracting_jar_with_shell_prefix() {
        // 4 KiB of prefix, as a self-extracting installer would carry
        let resolver =
            MemoryResolver::new().with_file("/opt/app/installer.jar", &jar_bytes(4096));
        let packages = run(&resolver);

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "demo-app");
        assert_eq!(packages[0].version, "1.4.2");
    }

    #[test]
    fn test_manifest_fallback_without_pom() {
        let bytes = build_zip(
            &[FixtureEntry {
                name: "META-INF/MANIFEST.MF",
                data: b"Manifest-Version: 1.0\nImplementation-Title: plain-lib\nImplementation-Version: 0.9\n".to_vec(),
                deflate: false,
            }],
            0,
        );
        let resolver = MemoryResolver::new().with_file("/lib/plain-lib.jar", &bytes);
        let packages = run(&resolver);
        assert_eq!(packages[0].name, "plain-lib");
        assert_eq!(packages[0].version, "0.9");
    }

    #[test]
    fn test_filename_fallback() {
        let bytes = build_zip(
            &[FixtureEntry {
                name: "content.txt",
                data: b"no metadata here".to_vec(),
                deflate: false,
            }],
            0,
        );
        let resolver = MemoryResolver::new().with_file("/lib/mystery-2.0.1.jar", &bytes);
        let packages = run(&resolver);
        assert_eq!(packages[0].name, "mystery");
        assert_eq!(packages[0].version, "2.0.1");
    }
}
