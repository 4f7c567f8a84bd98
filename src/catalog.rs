// src/catalog.rs

//! Top-level cataloging orchestration
//!
//! The main execution path: resolve a source to a scope-parameterized
//! resolver, identify the distribution, run the selected catalogers,
//! catalog files, synthesize relationships, and assemble the final SBOM.
//!
//! Cancellation yields the partial result tagged as canceled rather than
//! an error; callers decide whether to keep it.

use crate::cancel::CancelToken;
use crate::cataloging::{
    relationships, runtime, select, DataGenerationConfig, ExecutorConfig, RelationshipsConfig,
    SearchConfig, SelectionRequest,
};
use crate::error::Result;
use crate::file::CoordinateSet;
use crate::filecatalog::{self, BuiltinLicenseScanner, FileCatalogConfig, LicenseScanner};
use crate::linux::{Release, OS_RELEASE_PATHS};
use crate::pkg::cataloger::ParseFailure;
use crate::sbom::{Artifacts, Descriptor, Sbom};
use crate::source::{Resolver, Source};
use std::io::Read;
use tracing::{debug, info};

/// The resolved configuration for one cataloging run
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    pub search: SearchConfig,
    pub relationships: RelationshipsConfig,
    pub data_generation: DataGenerationConfig,
    pub executor: ExecutorConfig,
    pub files: FileCatalogConfig,
    pub selection: SelectionRequest,
}

/// The result of a cataloging run
#[derive(Debug)]
pub struct CatalogOutcome {
    pub sbom: Sbom,
    /// True when the run was interrupted; the SBOM is partial
    pub canceled: bool,
    pub failures: Vec<ParseFailure>,
}

/// Catalog a source into an SBOM using the built-in license scanner.
pub fn catalog_source(
    source: &dyn Source,
    config: &CatalogConfig,
    token: &CancelToken,
) -> Result<CatalogOutcome> {
    catalog_source_with_scanner(source, config, &BuiltinLicenseScanner::new(), token)
}

/// Catalog a source with an injected license scanner.
pub fn catalog_source_with_scanner(
    source: &dyn Source,
    config: &CatalogConfig,
    scanner: &dyn LicenseScanner,
    token: &CancelToken,
) -> Result<CatalogOutcome> {
    let resolver = source.file_resolver(config.search.scope)?;
    let description = source.describe();

    let release = identify_release(resolver.as_ref());
    if let Some(release) = &release {
        info!(distro = release.id.as_str(), "identified linux distribution");
    }

    let registry = select::default_catalogers();
    let selected = select::select(&registry, &config.selection);
    debug!(count = selected.len(), "cataloger selection resolved");

    let outcome = runtime::run_catalogers(
        &selected,
        resolver.as_ref(),
        release.as_ref(),
        &config.executor,
        &config.data_generation,
        token,
    );
    let mut canceled = outcome.canceled;

    // file cataloging; a canceled pass still yields the partial SBOM
    let files = match filecatalog::catalog_files(
        resolver.as_ref(),
        &outcome.packages,
        &config.files,
        scanner,
        token,
    ) {
        Ok(files) => files,
        Err(crate::error::Error::Canceled) => {
            canceled = true;
            Default::default()
        }
        Err(e) => return Err(e),
    };

    // the coordinate universe for ownership edges spans file artifacts and
    // package evidence
    let mut universe = CoordinateSet::default();
    for coordinates in files.coordinates() {
        universe.add(coordinates);
    }
    for package in outcome.packages.sorted() {
        for location in package.locations.iter() {
            universe.add(location.coordinates.clone());
        }
    }

    let (packages, relationship_list) = relationships::finalize(
        outcome.packages,
        outcome.relationships,
        &universe,
        &config.relationships,
    );

    let sbom = Sbom {
        artifacts: Artifacts {
            packages,
            linux_distribution: release,
            ..Default::default()
        }
        .with_files(files),
        relationships: relationship_list,
        source: description,
        descriptor: Descriptor::this_tool(),
    };

    Ok(CatalogOutcome {
        sbom,
        canceled: canceled || token.is_canceled(),
        failures: outcome.failures,
    })
}

/// Probe the source for os-release data.
pub fn identify_release(resolver: &dyn Resolver) -> Option<Release> {
    for path in OS_RELEASE_PATHS.iter().copied() {
        let Ok(found) = resolver.files_by_path(&[path]) else {
            continue;
        };
        let Some(location) = found.first() else {
            continue;
        };
        let Ok(mut reader) = resolver.file_contents_by_location(location) else {
            continue;
        };
        let mut content = String::new();
        if reader.read_to_string(&mut content).is_err() {
            continue;
        }
        if let Some(release) = Release::parse(&content) {
            return Some(release);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::RelationshipType;
    use crate::file::Selection;
    use crate::pkg::cataloger::rpm::test_support::{build_header_blob, HeaderSpec};
    use crate::pkg::PackageType;
    use crate::source::layered::test_support::{build_layers, LayerSpec};
    use crate::source::{DirectorySource, LayeredSource, Scope};
    use std::fs;

    const OS_RELEASE: &str = "ID=\"rocky\"\nVERSION_ID=\"9.3\"\nPRETTY_NAME=\"Rocky Linux 9.3\"\n";

    fn coreutils_blob() -> Vec<u8> {
        build_header_blob(&HeaderSpec {
            name: "coreutils",
            version: "9.0",
            release: "1.el9",
            arch: "x86_64",
            files: vec![("/usr/bin/", "ls")],
            license: "GPLv3+",
        })
    }

    #[test]
    fn test_directory_scan_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("var/lib/rpm")).unwrap();
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/os-release"), OS_RELEASE).unwrap();
        fs::write(dir.path().join("var/lib/rpm/Packages"), coreutils_blob()).unwrap();

        let source = DirectorySource::new(dir.path()).unwrap();
        let outcome = catalog_source(&source, &CatalogConfig::default(), &CancelToken::new())
            .unwrap();

        assert!(!outcome.canceled);
        let packages = outcome.sbom.packages_sorted();
        assert_eq!(packages.len(), 1);
        let package = packages[0];
        assert_eq!(package.name, "coreutils");
        assert_eq!(package.package_type, PackageType::Rpm);
        assert_eq!(
            package.purl,
            "pkg:rpm/rocky/coreutils@9.0-1.el9?arch=x86_64&distro=rocky-9.3"
        );

        // one evident-by edge to the database file
        let evident: Vec<_> = outcome
            .sbom
            .relationships_sorted()
            .into_iter()
            .filter(|r| r.kind == RelationshipType::EvidentBy)
            .cloned()
            .collect();
        assert_eq!(evident.len(), 1);
        assert_eq!(
            evident[0].to.as_coordinates().unwrap().real_path,
            "/var/lib/rpm/Packages"
        );

        assert_eq!(
            outcome.sbom.artifacts.linux_distribution.as_ref().unwrap().id,
            "rocky"
        );
    }

    #[test]
    fn test_layered_scan_elides_owned_binary() {
        let dir = tempfile::tempdir().unwrap();

        // lower layer installs the python RPM claiming /usr/bin/python3;
        // the binary itself matches the python classifier
        let mut python_binary = b"\x7fELF\x02\x01\x01\x00".to_vec();
        python_binary.extend_from_slice(b" python3.11.7 ");
        python_binary.resize(2048, 0);
        python_binary[16] = 2;

        let rpm_blob = build_header_blob(&HeaderSpec {
            name: "python3",
            version: "3.11.7",
            release: "1.el9",
            arch: "x86_64",
            files: vec![("/usr/bin/", "python3")],
            license: "Python-2.0",
        });

        let layers = build_layers(
            dir.path(),
            &[
                LayerSpec {
                    files: vec![
                        ("/var/lib/rpm/Packages", rpm_blob),
                        ("/usr/bin/python3", python_binary),
                    ],
                    whiteouts: vec![],
                },
                LayerSpec {
                    files: vec![("/etc/marker", b"upper".to_vec())],
                    whiteouts: vec![],
                },
            ],
        );
        let source = LayeredSource::from_layer_archives("py:latest", &layers).unwrap();

        let config = CatalogConfig {
            search: SearchConfig::default().with_scope(Scope::Squashed),
            files: FileCatalogConfig::default().with_selection(Selection::OwnedByPackage),
            ..Default::default()
        };
        let outcome = catalog_source(&source, &config, &CancelToken::new()).unwrap();

        // the classifier package was elided by ownership overlap
        let packages = outcome.sbom.packages_sorted();
        assert_eq!(packages.len(), 1, "{:?}", packages);
        assert_eq!(packages[0].name, "python3");
        assert_eq!(packages[0].package_type, PackageType::Rpm);

        // the claimed file got a contains edge
        assert!(outcome
            .sbom
            .relationships_sorted()
            .iter()
            .any(|r| r.kind == RelationshipType::Contains));
    }

    #[test]
    fn test_layered_scan_keeps_binary_without_elision() {
        let dir = tempfile::tempdir().unwrap();
        let mut python_binary = b"\x7fELF\x02\x01\x01\x00".to_vec();
        python_binary.extend_from_slice(b" python3.11.7 ");
        python_binary.resize(2048, 0);
        python_binary[16] = 2;

        let layers = build_layers(
            dir.path(),
            &[LayerSpec {
                files: vec![("/usr/bin/python3", python_binary)],
                whiteouts: vec![],
            }],
        );
        let source = LayeredSource::from_layer_archives("py:latest", &layers).unwrap();

        let outcome =
            catalog_source(&source, &CatalogConfig::default(), &CancelToken::new()).unwrap();
        let packages = outcome.sbom.packages_sorted();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].package_type, PackageType::Binary);
        assert_eq!(packages[0].version, "3.11.7");
    }

    #[test]
    fn test_canceled_run_returns_partial_flagged() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("go.mod"), "module x\nrequire a.b/c v1.0.0\n").unwrap();
        let source = DirectorySource::new(dir.path()).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let outcome = catalog_source(&source, &CatalogConfig::default(), &token).unwrap();
        assert!(outcome.canceled);
    }

    #[test]
    fn test_description_only_source_fails_setup() {
        let source = crate::source::from_description(Default::default());
        let err =
            catalog_source(&source, &CatalogConfig::default(), &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("no file resolver"));
    }
}
