// src/artifact.rs

//! Stable identity and typed relationships between cataloged entities
//!
//! Every identifiable entity carries an [`ArtifactId`]: a 16-hex-digit
//! fingerprint derived from a structural hash of its content-defining
//! fields. Two conventions make the fingerprint stable:
//!
//! - absent (`None`) and zero values hash identically
//! - sequences used as sets hash irrespective of element order
//!
//! Relationships are directed typed edges between two identifiable nodes
//! (packages or file coordinates).

use crate::file::Coordinates;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use xxhash_rust::xxh3::Xxh3;

/// A unique, stable fingerprint for a cataloged entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ArtifactId {
    fn from(s: &str) -> Self {
        ArtifactId(s.to_string())
    }
}

/// Anything that exposes a stable [`ArtifactId`]
pub trait Identifiable {
    fn id(&self) -> ArtifactId;
}

/// Compute the 16-hex-digit fingerprint of a hashable value.
///
/// The value's `Hash` implementation defines which fields are
/// content-defining; implementations for model types skip metadata-only
/// fields (access paths, annotations) on purpose.
pub fn id_of<T: Hash + ?Sized>(value: &T) -> ArtifactId {
    let mut hasher = Xxh3::new();
    value.hash(&mut hasher);
    ArtifactId(format!("{:016x}", hasher.finish()))
}

/// Hash a sequence as a set: element order does not affect the result.
///
/// Each element is hashed independently and the 64-bit digests are
/// combined with addition, which is commutative.
pub fn hash_unordered<T: Hash, H: Hasher>(items: &[T], state: &mut H) {
    let mut combined: u64 = 0;
    for item in items {
        let mut h = Xxh3::new();
        item.hash(&mut h);
        combined = combined.wrapping_add(h.finish());
    }
    state.write_u64(combined);
    state.write_usize(items.len());
}

/// Hash an optional value such that `None` and the type default are
/// indistinguishable.
pub fn hash_option_as_zero<T: Hash + Default + PartialEq, H: Hasher>(
    value: &Option<T>,
    state: &mut H,
) {
    match value {
        Some(v) if *v != T::default() => v.hash(state),
        _ => T::default().hash(state),
    }
}

/// The kind of edge between two cataloged entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipType {
    /// The parent package claims ownership of the child package because the
    /// parent's metadata lists a file that was evidence of the child. Only
    /// created after all package cataloging has completed.
    OwnershipByFileOverlap,

    /// Package-to-file edge: the existence of the package is evident by the
    /// contents of the file. Maps to SPDX OTHER with an EVIDENT_BY comment.
    EvidentBy,

    /// Proxy for the SPDX CONTAINS relationship.
    Contains,

    /// Proxy for the SPDX DEPENDENCY_OF relationship.
    DependencyOf,

    /// Proxy for the SPDX DESCRIBED_BY relationship.
    DescribedBy,
}

impl RelationshipType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OwnershipByFileOverlap => "ownership-by-file-overlap",
            Self::EvidentBy => "evident-by",
            Self::Contains => "contains",
            Self::DependencyOf => "dependency-of",
            Self::DescribedBy => "described-by",
        }
    }

    pub fn all() -> [RelationshipType; 5] {
        [
            Self::OwnershipByFileOverlap,
            Self::EvidentBy,
            Self::Contains,
            Self::DependencyOf,
            Self::DescribedBy,
        ]
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One endpoint of a relationship: a package (by id) or a file location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum RelationshipNode {
    Package { id: ArtifactId },
    File { coordinates: Coordinates },
}

impl RelationshipNode {
    pub fn package(id: ArtifactId) -> Self {
        RelationshipNode::Package { id }
    }

    pub fn file(coordinates: Coordinates) -> Self {
        RelationshipNode::File { coordinates }
    }

    /// The file coordinates behind this node, when it is a file node.
    pub fn as_coordinates(&self) -> Option<&Coordinates> {
        match self {
            RelationshipNode::File { coordinates } => Some(coordinates),
            RelationshipNode::Package { .. } => None,
        }
    }

    pub fn package_id(&self) -> Option<&ArtifactId> {
        match self {
            RelationshipNode::Package { id } => Some(id),
            RelationshipNode::File { .. } => None,
        }
    }
}

impl Identifiable for RelationshipNode {
    fn id(&self) -> ArtifactId {
        match self {
            RelationshipNode::Package { id } => id.clone(),
            RelationshipNode::File { coordinates } => coordinates.id(),
        }
    }
}

/// A directed typed edge between two identifiable entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: RelationshipNode,
    pub to: RelationshipNode,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Relationship {
    pub fn new(from: RelationshipNode, to: RelationshipNode, kind: RelationshipType) -> Self {
        Relationship {
            from,
            to,
            kind,
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Total sort key: (from.id, to.id, type).
    pub fn sort_key(&self) -> (ArtifactId, ArtifactId, RelationshipType) {
        (self.from.id(), self.to.id(), self.kind)
    }
}

/// Sort relationships into the stable output order and drop duplicates.
pub fn sort_relationships(relationships: &mut Vec<Relationship>) {
    relationships.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    relationships.dedup_by(|a, b| a.from == b.from && a.to == b.to && a.kind == b.kind);
}
