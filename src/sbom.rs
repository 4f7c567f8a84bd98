// src/sbom.rs

//! The assembled software bill of materials
//!
//! An [`Sbom`] bundles the package collection, the per-file artifact maps,
//! the relationship list, the source description, and a descriptor naming
//! the producing tool. Accessors expose the stable output orderings:
//! packages by (type, name, version, id) and relationships by
//! (from.id, to.id, type).

use crate::artifact::Relationship;
use crate::file::{Coordinates, CoordinateSet, Digest, Executable, License, Metadata};
use crate::filecatalog::FileArtifacts;
use crate::linux::Release;
use crate::pkg::{Collection, Package};
use crate::source::Description;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything discovered within the source
#[derive(Debug, Default)]
pub struct Artifacts {
    pub packages: Collection,
    pub file_metadata: HashMap<Coordinates, Metadata>,
    pub file_digests: HashMap<Coordinates, Vec<Digest>>,
    pub file_contents: HashMap<Coordinates, String>,
    pub file_licenses: HashMap<Coordinates, Vec<License>>,
    pub executables: HashMap<Coordinates, Executable>,
    pub linux_distribution: Option<Release>,
}

impl Artifacts {
    pub fn with_files(mut self, files: FileArtifacts) -> Self {
        self.file_metadata = files.metadata;
        self.file_digests = files.digests;
        self.file_contents = files.contents;
        self.file_licenses = files.licenses;
        self.executables = files.executables;
        self
    }
}

/// Names the tool (and configuration) that produced the SBOM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configuration: Option<serde_json::Value>,
}

impl Descriptor {
    /// The descriptor for this build of the engine.
    pub fn this_tool() -> Descriptor {
        Descriptor {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            configuration: None,
        }
    }
}

/// The assembled SBOM
#[derive(Debug, Default)]
pub struct Sbom {
    pub artifacts: Artifacts,
    pub relationships: Vec<Relationship>,
    pub source: Description,
    pub descriptor: Descriptor,
}

impl Sbom {
    /// Packages in the stable output order.
    pub fn packages_sorted(&self) -> Vec<&Package> {
        self.artifacts.packages.sorted()
    }

    /// Relationships in the stable output order.
    pub fn relationships_sorted(&self) -> Vec<&Relationship> {
        let mut out: Vec<&Relationship> = self.relationships.iter().collect();
        out.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        out
    }

    /// Every file coordinate mentioned anywhere in the SBOM.
    pub fn all_coordinates(&self) -> CoordinateSet {
        let mut set = CoordinateSet::default();
        for coordinates in self
            .artifacts
            .file_metadata
            .keys()
            .chain(self.artifacts.file_digests.keys())
            .chain(self.artifacts.file_contents.keys())
            .chain(self.artifacts.file_licenses.keys())
            .chain(self.artifacts.executables.keys())
        {
            set.add(coordinates.clone());
        }
        for relationship in &self.relationships {
            for node in [&relationship.from, &relationship.to] {
                if let Some(coordinates) = node.as_coordinates() {
                    set.add(coordinates.clone());
                }
            }
        }
        for package in self.artifacts.packages.sorted() {
            for location in package.locations.iter() {
                set.add(location.coordinates.clone());
            }
        }
        set
    }

    /// Relationships whose `from` endpoint is the given package.
    pub fn relationships_for_package(&self, package: &Package) -> Vec<&Relationship> {
        self.relationships_sorted()
            .into_iter()
            .filter(|r| r.from.package_id() == Some(package.id()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Relationship, RelationshipNode, RelationshipType};
    use crate::file::Location;
    use crate::file::LocationSet;
    use crate::pkg::PackageType;

    fn package(name: &str) -> Package {
        Package {
            name: name.to_string(),
            version: "1.0".to_string(),
            package_type: PackageType::Rpm,
            locations: LocationSet::new([Location::new(format!("/db/{}", name))]),
            ..Default::default()
        }
        .with_id()
    }

    #[test]
    fn test_relationship_ordering_is_stable() {
        let a = package("a");
        let b = package("b");
        let mut sbom = Sbom::default();
        sbom.relationships = vec![
            Relationship::new(
                RelationshipNode::package(b.id().clone()),
                RelationshipNode::package(a.id().clone()),
                RelationshipType::DependencyOf,
            ),
            Relationship::new(
                RelationshipNode::package(a.id().clone()),
                RelationshipNode::package(b.id().clone()),
                RelationshipType::Contains,
            ),
        ];

        let sorted = sbom.relationships_sorted();
        let keys: Vec<_> = sorted.iter().map(|r| r.sort_key()).collect();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_all_coordinates_spans_maps_and_packages() {
        let mut sbom = Sbom::default();
        sbom.artifacts
            .file_metadata
            .insert(Coordinates::new("/from-metadata"), Metadata::default());
        sbom.artifacts.packages.add(package("zlib"));
        sbom.relationships.push(Relationship::new(
            RelationshipNode::package(crate::artifact::ArtifactId::from("feedfacefeedface")),
            RelationshipNode::file(Coordinates::new("/from-relationship")),
            RelationshipType::EvidentBy,
        ));

        let all = sbom.all_coordinates();
        assert!(all.contains(&Coordinates::new("/from-metadata")));
        assert!(all.contains(&Coordinates::new("/from-relationship")));
        assert!(all.contains(&Coordinates::new("/db/zlib")));
    }
}
