// src/pkg/cataloger/binary.rs

//! binary classifier cataloger
//!
//! Classifies executables by matching a content pattern against files
//! claimed by glob. Each classifier names the package it evidences and a
//! capture group extracting the version from the binary's bytes. Matches
//! become `binary` packages carrying the classifier name in their
//! metadata, which is what the overlap-elision rule keys off when an OS
//! package also claims the same file.

use crate::pkg::cataloger::{Cataloger, ParseContext, ParseOutcome};
use crate::pkg::{BinarySignature, Language, Package, PackageMetadata, PackageType, PackageUrl};
use regex::bytes::Regex;
use std::io::Read;

/// A single classification rule
struct Classifier {
    /// Rule identifier recorded in the package metadata
    class: &'static str,
    /// Package name emitted on match
    package: &'static str,
    /// File claim
    globs: &'static [&'static str],
    /// Version-bearing content pattern with a `version` capture group
    pattern: &'static str,
    purl_type: &'static str,
}

fn default_classifiers() -> Vec<Classifier> {
    vec![
        Classifier {
            class: "python-binary",
            package: "python",
            globs: &["**/python", "**/python[0-9]*"],
            pattern: r"(?-u)python(?P<version>[0-9]+\.[0-9]+(\.[0-9]+)?)",
            purl_type: "generic",
        },
        Classifier {
            class: "go-binary",
            package: "go",
            globs: &["**/go"],
            pattern: r"(?-u)go(?P<version>1\.[0-9]+(\.[0-9]+)?)",
            purl_type: "generic",
        },
        Classifier {
            class: "nodejs-binary",
            package: "node",
            globs: &["**/node"],
            pattern: r"(?-u)node\.js/v(?P<version>[0-9]+\.[0-9]+\.[0-9]+)",
            purl_type: "generic",
        },
        Classifier {
            class: "busybox-binary",
            package: "busybox",
            globs: &["**/busybox"],
            pattern: r"(?-u)BusyBox v(?P<version>[0-9]+\.[0-9]+\.[0-9]+)",
            purl_type: "generic",
        },
    ]
}

/// Cataloger over classified binaries
pub fn classifier_cataloger() -> Cataloger {
    let mut cataloger = Cataloger::new("binary-cataloger");
    for classifier in default_classifiers() {
        let regex = Regex::new(classifier.pattern).expect("classifier patterns are static");
        let class = classifier.class;
        let package_name = classifier.package;
        let purl_type = classifier.purl_type;
        cataloger = cataloger.with_parser_by_globs(
            move |reader: &mut (dyn Read + Send), ctx: &ParseContext| {
                classify(reader, ctx, &regex, class, package_name, purl_type)
            },
            classifier.globs,
        );
    }
    cataloger
}

fn classify(
    reader: &mut (dyn Read + Send),
    ctx: &ParseContext,
    regex: &Regex,
    class: &str,
    package_name: &str,
    purl_type: &str,
) -> ParseOutcome {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;

    let Some(captures) = regex.captures(&data) else {
        // no match is a clean miss, not a failure
        return Ok((Vec::new(), Vec::new()));
    };
    let version = captures
        .name("version")
        .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
        .unwrap_or_default();

    let mut package = Package {
        name: package_name.to_string(),
        version: version.clone(),
        package_type: PackageType::Binary,
        language: Language::None,
        purl: PackageUrl::new(purl_type, package_name)
            .with_version(&version)
            .to_string(),
        metadata: Some(PackageMetadata::BinarySignature(BinarySignature {
            classifier: class.to_string(),
        })),
        ..Default::default()
    };
    package
        .locations
        .add(ctx.location.clone().with_primary_evidence());

    Ok((vec![package], Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::event::TaskProgress;
    use crate::source::MemoryResolver;

    fn run(resolver: &MemoryResolver) -> Vec<Package> {
        let token = CancelToken::new();
        let progress = TaskProgress::new(0);
        let batch = classifier_cataloger()
            .catalog(resolver, None, &token, &progress)
            .unwrap();
        batch.packages
    }

    #[test]
    fn test_python_binary_classified() {
        let mut fake = b"\x7fELF\x02\x01\x01\x00 strings strings python3.11.7 more".to_vec();
        fake.resize(1024, 0);
        let resolver = MemoryResolver::new().with_file("/usr/bin/python3.11", &fake);

        let packages = run(&resolver);
        assert_eq!(packages.len(), 1);
        let package = &packages[0];
        assert_eq!(package.name, "python");
        assert_eq!(package.version, "3.11.7");
        assert_eq!(package.package_type, PackageType::Binary);
        assert!(matches!(
            package.metadata,
            Some(PackageMetadata::BinarySignature(_))
        ));
    }

    #[test]
    fn test_busybox_classified() {
        let fake = b"junk BusyBox v1.36.1 (2024-01-01) multi-call binary junk".to_vec();
        let resolver = MemoryResolver::new().with_file("/bin/busybox", &fake);

        let packages = run(&resolver);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "busybox");
        assert_eq!(packages[0].version, "1.36.1");
    }

    #[test]
    fn test_no_match_emits_nothing() {
        let resolver = MemoryResolver::new().with_file("/usr/bin/python3", b"just a stub script");
        let packages = run(&resolver);
        assert!(packages.is_empty());
    }
}
