// src/cataloging/relationships.rs

//! Relationship synthesis
//!
//! Runs after all catalogers have completed. Derives:
//! - package-to-file ownership edges (`contains`) for paths claimed by
//!   package metadata, restricted to coordinates known to the SBOM
//! - package-to-package `ownership-by-file-overlap` edges where one
//!   package's claimed files were another package's discovery evidence
//! - `evident-by` edges from primary-evidence location annotations
//!
//! When configured, binary-classifier packages whose evidence overlaps a
//! non-binary package's ownership are elided from the collection, along
//! with any relationships touching them.
//!
//! Synthesis never errors and is idempotent: bad inputs are skipped, and a
//! second run over the same input yields the identical sorted list.

use crate::artifact::{
    sort_relationships, ArtifactId, Relationship, RelationshipNode, RelationshipType,
};
use crate::cataloging::config::RelationshipsConfig;
use crate::file::{Coordinates, CoordinateSet, EVIDENCE_ANNOTATION, PRIMARY_EVIDENCE};
use crate::pkg::{Collection, Package, PackageType};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Apply relationship synthesis and the binary elision rule.
pub fn finalize(
    mut collection: Collection,
    mut relationships: Vec<Relationship>,
    coordinate_universe: &CoordinateSet,
    config: &RelationshipsConfig,
) -> (Collection, Vec<Relationship>) {
    let packages: Vec<Package> = collection.sorted().into_iter().cloned().collect();

    relationships.extend(evident_by(&packages));
    if config.package_file_ownership {
        relationships.extend(file_ownership(&packages, coordinate_universe));
    }
    if config.package_file_ownership_overlap {
        let overlaps = ownership_overlap(&packages);
        if config.exclude_binary_packages_with_file_ownership_overlap {
            let elided = binary_elision(&packages, &overlaps);
            for id in &elided {
                debug!(package = id.as_str(), "eliding binary package with owned evidence");
                collection.remove(id);
            }
            relationships.extend(overlaps);
            relationships.retain(|r| {
                let touches_elided = |node: &RelationshipNode| match node {
                    RelationshipNode::Package { id } => elided.contains(id),
                    RelationshipNode::File { .. } => false,
                };
                !touches_elided(&r.from) && !touches_elided(&r.to)
            });
        } else {
            relationships.extend(overlaps);
        }
    }

    sort_relationships(&mut relationships);
    (collection, relationships)
}

/// Package-to-file edges for every primary-evidence location.
fn evident_by(packages: &[Package]) -> Vec<Relationship> {
    let mut out = Vec::new();
    for package in packages {
        for location in package.locations.iter() {
            if location.annotations.get(EVIDENCE_ANNOTATION).map(String::as_str)
                == Some(PRIMARY_EVIDENCE)
            {
                out.push(Relationship::new(
                    RelationshipNode::package(package.id().clone()),
                    RelationshipNode::file(location.coordinates.clone()),
                    RelationshipType::EvidentBy,
                ));
            }
        }
    }
    out
}

/// Package-to-file `contains` edges for metadata-claimed paths that exist
/// in the SBOM's coordinate universe.
fn file_ownership(
    packages: &[Package],
    coordinate_universe: &CoordinateSet,
) -> Vec<Relationship> {
    let mut by_path: HashMap<&str, Vec<&Coordinates>> = HashMap::new();
    for coordinates in coordinate_universe.iter() {
        by_path
            .entry(coordinates.real_path.as_str())
            .or_default()
            .push(coordinates);
    }

    let mut out = Vec::new();
    for package in packages {
        for path in package.owned_files() {
            let Some(matches) = by_path.get(path.as_str()) else {
                continue;
            };
            for coordinates in matches {
                out.push(
                    Relationship::new(
                        RelationshipNode::package(package.id().clone()),
                        RelationshipNode::file((*coordinates).clone()),
                        RelationshipType::Contains,
                    )
                    .with_data(serde_json::json!({ "path": path })),
                );
            }
        }
    }
    out
}

/// `A overlaps B` when a file A claims to own is evidence of B.
fn ownership_overlap(packages: &[Package]) -> Vec<Relationship> {
    let mut owners_by_path: HashMap<String, Vec<&Package>> = HashMap::new();
    for package in packages {
        for path in package.owned_files() {
            owners_by_path.entry(path).or_default().push(package);
        }
    }

    let mut out = Vec::new();
    for package in packages {
        for location in package.locations.iter() {
            let Some(owners) = owners_by_path.get(location.real_path()) else {
                continue;
            };
            for owner in owners {
                if owner.id() == package.id() {
                    continue;
                }
                out.push(Relationship::new(
                    RelationshipNode::package(owner.id().clone()),
                    RelationshipNode::package(package.id().clone()),
                    RelationshipType::OwnershipByFileOverlap,
                ));
            }
        }
    }
    out
}

/// Binary-classifier packages owned (by overlap) by a non-binary package.
fn binary_elision(packages: &[Package], overlaps: &[Relationship]) -> HashSet<ArtifactId> {
    let by_id: HashMap<ArtifactId, &Package> =
        packages.iter().map(|p| (p.id().clone(), p)).collect();

    let mut elided = HashSet::new();
    for relationship in overlaps {
        if relationship.kind != RelationshipType::OwnershipByFileOverlap {
            continue;
        }
        let (Some(owner_id), Some(owned_id)) = (
            relationship.from.package_id(),
            relationship.to.package_id(),
        ) else {
            continue;
        };
        let (Some(owner), Some(owned)) = (by_id.get(owner_id), by_id.get(owned_id)) else {
            continue;
        };
        if owned.package_type == PackageType::Binary && owner.package_type != PackageType::Binary {
            elided.insert(owned.id().clone());
        }
    }
    elided
}
