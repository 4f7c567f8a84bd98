// tests/integration_test.rs

//! Integration tests for stocktake
//!
//! These tests drive the public API end to end: resolve a source, run the
//! cataloging pipeline, and push the result through the format codecs.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use stocktake::cataloging::{self, SelectionRequest};
use stocktake::format::{DecoderCollection, EncoderCollection};
use stocktake::source::{DirectorySource, LayeredSource, Scope};
use stocktake::{
    catalog_source, get_source, CancelToken, CatalogConfig, Error, GetSourceConfig,
    RelationshipType, Source,
};

const OS_RELEASE: &str = "ID=debian\nVERSION_ID=\"12\"\nPRETTY_NAME=\"Debian GNU/Linux 12\"\n";

const DPKG_STATUS: &str = "\
Package: bash
Status: install ok installed
Version: 5.2.15-2
Architecture: amd64
Depends: base-files
Description: GNU Bourne Again SHell

Package: base-files
Status: install ok installed
Version: 12.4
Architecture: amd64
Description: Debian base system miscellaneous files
";

/// A root filesystem with an installed dpkg database and the shell it claims.
fn debian_rootfs() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("var/lib/dpkg/info")).unwrap();
    fs::create_dir_all(dir.path().join("etc")).unwrap();
    fs::create_dir_all(dir.path().join("bin")).unwrap();
    fs::write(dir.path().join("etc/os-release"), OS_RELEASE).unwrap();
    fs::write(dir.path().join("var/lib/dpkg/status"), DPKG_STATUS).unwrap();
    fs::write(
        dir.path().join("var/lib/dpkg/info/bash.list"),
        "/.\n/bin/bash\n",
    )
    .unwrap();
    fs::write(dir.path().join("bin/bash"), b"#!/bin/sh\necho fake shell\n").unwrap();
    dir
}

fn build_layer_tar(dir: &Path, index: usize, files: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(format!("layer{}.tar", index));
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name.trim_start_matches('/'), *data)
            .unwrap();
    }
    fs::write(&path, builder.into_inner().unwrap()).unwrap();
    path
}

#[test]
fn test_directory_scan_end_to_end() {
    let rootfs = debian_rootfs();
    let source = DirectorySource::new(rootfs.path()).unwrap();

    let outcome = catalog_source(&source, &CatalogConfig::default(), &CancelToken::new()).unwrap();
    assert!(!outcome.canceled, "run should complete without cancellation");
    assert!(
        outcome.failures.is_empty(),
        "no parse failures expected: {:?}",
        outcome.failures
    );

    let packages = outcome.sbom.packages_sorted();
    let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["base-files", "bash"]);
    assert_eq!(
        packages[1].purl,
        "pkg:deb/debian/bash@5.2.15-2?arch=amd64&distro=debian-12",
        "purl should carry the identified distro"
    );
    assert_eq!(
        outcome.sbom.artifacts.linux_distribution.as_ref().unwrap().id,
        "debian"
    );

    // bash is evident by the status database and contains its claimed shell
    let relationships = outcome.sbom.relationships_sorted();
    assert!(relationships
        .iter()
        .any(|r| r.kind == RelationshipType::EvidentBy
            && r.to.as_coordinates().map(|c| c.real_path.as_str()) == Some("/var/lib/dpkg/status")));
    assert!(relationships
        .iter()
        .any(|r| r.kind == RelationshipType::Contains
            && r.to.as_coordinates().map(|c| c.real_path.as_str()) == Some("/bin/bash")));

    // the dependency edge survived id recomputation in the runtime
    let dependency = relationships
        .iter()
        .find(|r| r.kind == RelationshipType::DependencyOf)
        .expect("bash depends on base-files");
    for node in [&dependency.from, &dependency.to] {
        let id = node.package_id().expect("both endpoints are packages");
        assert!(
            outcome.sbom.artifacts.packages.contains(id),
            "dependency endpoint must be a cataloged package"
        );
    }
}

#[test]
fn test_native_format_roundtrip_is_byte_exact() {
    let rootfs = debian_rootfs();
    let source = DirectorySource::new(rootfs.path()).unwrap();
    let outcome = catalog_source(&source, &CatalogConfig::default(), &CancelToken::new()).unwrap();

    let encoders = EncoderCollection::default_collection();
    let encoder = encoders.get_by_string("stocktake-json").unwrap();

    let mut first = Vec::new();
    encoder.encode(&mut first, &outcome.sbom).unwrap();

    let decoders = DecoderCollection::default_collection();
    let mut cursor = Cursor::new(first.clone());
    let decoded = decoders.decode(&mut cursor).unwrap();
    assert_eq!(decoded.id.as_str(), "stocktake-json");

    let mut second = Vec::new();
    encoder.encode(&mut second, &decoded.sbom).unwrap();
    assert_eq!(first, second, "encode-decode-encode must be byte exact");
}

#[test]
fn test_every_standard_format_decodes_what_it_encoded() {
    let rootfs = debian_rootfs();
    let source = DirectorySource::new(rootfs.path()).unwrap();
    let outcome = catalog_source(&source, &CatalogConfig::default(), &CancelToken::new()).unwrap();

    let encoders = EncoderCollection::default_collection();
    let decoders = DecoderCollection::default_collection();

    for request in [
        "spdx-json@2.3",
        "spdx-tag-value@2.3",
        "cyclonedx-json@1.6",
        "cyclonedx-xml@1.6",
    ] {
        let encoder = encoders
            .get_by_string(request)
            .unwrap_or_else(|| panic!("no encoder for {}", request));
        let mut bytes = Vec::new();
        encoder.encode(&mut bytes, &outcome.sbom).unwrap();

        let mut cursor = Cursor::new(bytes);
        let decoded = decoders
            .decode(&mut cursor)
            .unwrap_or_else(|e| panic!("decode of {} failed: {}", request, e));

        let names: Vec<String> = decoded
            .sbom
            .packages_sorted()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["base-files".to_string(), "bash".to_string()],
            "format {} must carry both packages",
            request
        );
    }
}

#[test]
fn test_layered_source_scope_visibility() {
    let dir = tempfile::tempdir().unwrap();
    let lower = build_layer_tar(
        dir.path(),
        0,
        &[
            ("/etc/os-release", OS_RELEASE.as_bytes()),
            ("/bin/sh", b"lower shell"),
        ],
    );
    let upper = build_layer_tar(dir.path(), 1, &[("/bin/sh", b"upper shell")]);
    let source = LayeredSource::from_layer_archives("demo:latest", &[lower, upper]).unwrap();

    let squashed = source.file_resolver(Scope::Squashed).unwrap();
    let found = squashed.files_by_path(&["/bin/sh"]).unwrap();
    assert_eq!(found.len(), 1, "squashed scope sees only the top copy");

    let all_layers = source.file_resolver(Scope::AllLayers).unwrap();
    let found = all_layers.files_by_path(&["/bin/sh"]).unwrap();
    assert_eq!(found.len(), 2, "all-layers scope sees the shadowed copy too");
    assert_ne!(
        found[0].coordinates.file_system_id, found[1].coordinates.file_system_id,
        "each copy is attributed to its own layer"
    );
}

#[test]
fn test_encoder_negotiation() {
    let encoders = EncoderCollection::default_collection();

    // bare name resolves to the highest version
    assert_eq!(encoders.get_by_string("spdx-json").unwrap().version(), "2.3");
    // explicit version pins
    assert_eq!(
        encoders.get_by_string("cyclonedx-json@1.4").unwrap().version(),
        "1.4"
    );
    // aliases, case folding, and separator-insensitive names
    assert_eq!(
        encoders.get_by_string("CDX").unwrap().id().as_str(),
        "cyclonedx-json"
    );
    assert_eq!(
        encoders.get_by_string("SPDX_JSON").unwrap().id().as_str(),
        "spdx-json"
    );
    // all-versions expands the family
    let expanded = encoders.resolve("spdx-json@all-versions");
    let versions: Vec<String> = expanded.iter().map(|e| e.version()).collect();
    assert_eq!(versions, vec!["2.2", "2.3"]);
}

#[test]
fn test_decode_error_taxonomy() {
    let decoders = DecoderCollection::default_collection();

    // recognized family and version, malformed body
    let mut cursor = Cursor::new(b"{\"spdxVersion\": \"SPDX-2.3\", \"packages\": 42}".to_vec());
    let err = decoders.decode(&mut cursor).unwrap_err();
    let text = err.to_string();
    assert!(
        text.contains("spdx-json") && text.contains("2.3"),
        "error should name the recognized format: {}",
        text
    );

    // recognized family, unsupported version
    let mut cursor = Cursor::new(b"{\"spdxVersion\": \"SPDX-9.9\"}".to_vec());
    let err = decoders.decode(&mut cursor).unwrap_err();
    assert!(matches!(err, Error::FormatUnsupported { ref id } if id == "spdx-json"));

    // nothing matched at all
    let mut cursor = Cursor::new(b"plain text, not an sbom".to_vec());
    let err = decoders.decode(&mut cursor).unwrap_err();
    assert!(matches!(err, Error::FormatUnrecognized));
}

#[test]
fn test_cataloger_selection_expression() {
    let registry = cataloging::default_catalogers();
    let request = SelectionRequest::new().with_expression(&["+binary, -os, language"]);
    let selected = cataloging::select(&registry, &request);

    let mut names: Vec<&str> = selected.iter().map(|r| r.name()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "binary-cataloger",
            "go-module-file-cataloger",
            "java-archive-cataloger",
            "javascript-package-cataloger",
            "python-installed-package-cataloger",
        ],
        "a bare expression resolves against the whole registry"
    );
}

#[test]
fn test_get_source_reports_aggregated_failure() {
    let err = get_source("/no/such/input", &GetSourceConfig::default()).unwrap_err();
    match err {
        Error::SourceResolution { input, errors } => {
            assert_eq!(input, "/no/such/input");
            assert!(!errors.is_empty(), "per-provider errors must be aggregated");
        }
        other => panic!("unexpected error kind: {:?}", other),
    }
}

#[test]
fn test_canceled_scan_returns_partial_result() {
    let rootfs = debian_rootfs();
    let source = DirectorySource::new(rootfs.path()).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let outcome = catalog_source(&source, &CatalogConfig::default(), &token).unwrap();
    assert!(outcome.canceled, "a canceled run is flagged, not discarded");
}
