// src/format/github.rs

//! GitHub dependency-snapshot output (encode only)
//!
//! The snapshot shape groups resolved purls into manifests keyed by the
//! evidence path that produced them.

use crate::error::Result;
use crate::format::{FormatEncoder, FormatId};
use crate::sbom::Sbom;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

pub const FORMAT_ID: &str = "github-json";

#[derive(Serialize)]
struct Snapshot {
    version: u32,
    detector: Detector,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    manifests: BTreeMap<String, Manifest>,
    scanned: String,
}

#[derive(Serialize)]
struct Detector {
    name: String,
    version: String,
    url: String,
}

#[derive(Serialize)]
struct Manifest {
    name: String,
    resolved: BTreeMap<String, Resolved>,
}

#[derive(Serialize)]
struct Resolved {
    package_url: String,
    relationship: String,
    scope: String,
}

/// GitHub dependency snapshot encoder
pub struct Encoder;

impl FormatEncoder for Encoder {
    fn id(&self) -> FormatId {
        FormatId::from(FORMAT_ID)
    }

    fn aliases(&self) -> Vec<String> {
        vec!["github".to_string()]
    }

    fn version(&self) -> String {
        String::new()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        let mut manifests: BTreeMap<String, Manifest> = BTreeMap::new();

        for package in sbom.packages_sorted() {
            if package.purl.is_empty() {
                continue;
            }
            let manifest_path = package
                .locations
                .to_sorted_vec()
                .first()
                .map(|l| l.real_path().to_string())
                .unwrap_or_else(|| sbom.source.name.clone());

            let manifest = manifests
                .entry(manifest_path.clone())
                .or_insert_with(|| Manifest {
                    name: manifest_path,
                    resolved: BTreeMap::new(),
                });
            manifest.resolved.insert(
                package.name.clone(),
                Resolved {
                    package_url: package.purl.clone(),
                    relationship: "direct".to_string(),
                    scope: "runtime".to_string(),
                },
            );
        }

        let snapshot = Snapshot {
            version: 0,
            detector: Detector {
                name: sbom.descriptor.name.clone(),
                version: sbom.descriptor.version.clone(),
                url: format!("https://stocktake.dev/{}", sbom.descriptor.name),
            },
            manifests,
            scanned: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        serde_json::to_writer(writer, &snapshot)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{Location, LocationSet};
    use crate::pkg::{Collection, Package, PackageType};
    use crate::sbom::Artifacts;

    #[test]
    fn test_snapshot_groups_by_manifest() {
        let mut packages = Collection::default();
        packages.add(
            Package {
                name: "lodash".to_string(),
                version: "4.17.21".to_string(),
                package_type: PackageType::Npm,
                purl: "pkg:npm/lodash@4.17.21".to_string(),
                locations: LocationSet::new([Location::new("/app/package.json")]),
                ..Default::default()
            }
            .with_id(),
        );
        let sbom = Sbom {
            artifacts: Artifacts {
                packages,
                ..Default::default()
            },
            ..Default::default()
        };

        let mut out = Vec::new();
        Encoder.encode(&mut out, &sbom).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["version"], 0);
        assert_eq!(
            value["manifests"]["/app/package.json"]["resolved"]["lodash"]["package_url"],
            "pkg:npm/lodash@4.17.21"
        );
    }
}
