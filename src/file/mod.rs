// src/file/mod.rs

//! File identity and location model
//!
//! [`Coordinates`] are the minimal identity of a file within a source: the
//! symlink-free real path plus the filesystem (layer) that holds it.
//! [`Location`] layers access metadata on top: the path the file was reached
//! through (which may differ when traversal went through symlinks), an
//! opaque reference into the source's file index, and free-form annotations.
//!
//! Only coordinates ever participate in identity. Access paths and
//! annotations are metadata and are ignored when hashing, which is what
//! makes [`LocationSet`] membership symlink-agnostic.

mod executable;
mod license;
mod metadata;
pub mod mime;

pub use crate::hash::Digest;
pub use executable::{ElfSecurityFeatures, Executable, ExecutableFormat, RelocationReadOnly};
pub use license::{License, LicenseEvidence, LicenseType, parse_spdx_expression};
pub use metadata::{FileType, Metadata};

use crate::artifact::{self, ArtifactId, Identifiable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Annotation key carrying the evidence kind for a package location
pub const EVIDENCE_ANNOTATION: &str = "evidence";
/// The location's contents were the primary evidence of a package
pub const PRIMARY_EVIDENCE: &str = "primary";
/// The location supported the discovery of a package found elsewhere
pub const SUPPORTING_EVIDENCE: &str = "supporting";

/// File cataloging selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    /// Emit no file entries
    None,
    /// Emit entries only for files claimed by some package
    #[default]
    OwnedByPackage,
    /// Emit entries for every file the resolver can enumerate
    All,
}

/// The minimal information needed to find a file within any source
///
/// `real_path` has no symlinks in any ancestor. `file_system_id` is the
/// layer digest for layered sources and empty for directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "path")]
    pub real_path: String,
    #[serde(rename = "layerID", default, skip_serializing_if = "String::is_empty")]
    pub file_system_id: String,
}

impl Coordinates {
    pub fn new(real_path: impl Into<String>) -> Self {
        Coordinates {
            real_path: real_path.into(),
            file_system_id: String::new(),
        }
    }

    pub fn in_filesystem(real_path: impl Into<String>, file_system_id: impl Into<String>) -> Self {
        Coordinates {
            real_path: real_path.into(),
            file_system_id: file_system_id.into(),
        }
    }
}

impl Identifiable for Coordinates {
    fn id(&self) -> ArtifactId {
        artifact::id_of(self)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file_system_id.is_empty() {
            write!(f, "Location<RealPath={:?}>", self.real_path)
        } else {
            write!(
                f,
                "Location<RealPath={:?} Layer={:?}>",
                self.real_path, self.file_system_id
            )
        }
    }
}

/// A resolved file location: coordinates plus how the file was reached
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(flatten)]
    pub coordinates: Coordinates,

    /// The path used to reach the file, which may traverse symlinks
    #[serde(rename = "accessPath")]
    pub access_path: String,

    /// Opaque reference into the owning source's file index (zero when the
    /// location did not come from an indexed source). Never hashed.
    #[serde(skip)]
    pub ref_id: u64,

    /// Arbitrary key-value annotations. Never hashed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Location {
    /// A location whose access path equals its real path.
    pub fn new(real_path: impl Into<String>) -> Self {
        let real_path = real_path.into();
        Location {
            access_path: real_path.clone(),
            coordinates: Coordinates::new(real_path),
            ref_id: 0,
            annotations: BTreeMap::new(),
        }
    }

    /// A location reached through a different (symlinked) access path.
    pub fn virtual_path(real_path: impl Into<String>, access_path: impl Into<String>) -> Self {
        Location {
            coordinates: Coordinates::new(real_path),
            access_path: access_path.into(),
            ref_id: 0,
            annotations: BTreeMap::new(),
        }
    }

    pub fn from_coordinates(coordinates: Coordinates) -> Self {
        Location {
            access_path: coordinates.real_path.clone(),
            coordinates,
            ref_id: 0,
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_file_system_id(mut self, file_system_id: impl Into<String>) -> Self {
        self.coordinates.file_system_id = file_system_id.into();
        self
    }

    pub fn with_ref(mut self, ref_id: u64) -> Self {
        self.ref_id = ref_id;
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Annotate this location as primary evidence for a package.
    pub fn with_primary_evidence(self) -> Self {
        self.with_annotation(EVIDENCE_ANNOTATION, PRIMARY_EVIDENCE)
    }

    /// Annotate this location as supporting evidence for a package.
    pub fn with_supporting_evidence(self) -> Self {
        self.with_annotation(EVIDENCE_ANNOTATION, SUPPORTING_EVIDENCE)
    }

    pub fn real_path(&self) -> &str {
        &self.coordinates.real_path
    }

    /// The preferred display path: the access path when known.
    pub fn path(&self) -> &str {
        if self.access_path.is_empty() {
            &self.coordinates.real_path
        } else {
            &self.access_path
        }
    }
}

// Identity is carried entirely by the coordinates; access path, refs, and
// annotations must not influence equality or hashing.
impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.coordinates == other.coordinates
    }
}

impl Eq for Location {}

impl Hash for Location {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coordinates.hash(state);
    }
}

impl Identifiable for Location {
    fn id(&self) -> ArtifactId {
        self.coordinates.id()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut inner = format!("RealPath={:?}", self.coordinates.real_path);
        if !self.access_path.is_empty() && self.access_path != self.coordinates.real_path {
            inner.push_str(&format!(" AccessPath={:?}", self.access_path));
        }
        if !self.coordinates.file_system_id.is_empty() {
            inner.push_str(&format!(" Layer={:?}", self.coordinates.file_system_id));
        }
        write!(f, "Location<{}>", inner)
    }
}

/// A set of locations deduplicated by coordinates
///
/// Access paths are metadata and never affect membership. Adding an
/// already-present location merges its annotations. Conflicting values for
/// the same key keep the first-seen value; the partial merge is logged at
/// debug level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationSet {
    entries: Vec<Location>,
}

impl LocationSet {
    pub fn new(locations: impl IntoIterator<Item = Location>) -> Self {
        let mut set = LocationSet::default();
        set.add_all(locations);
        set
    }

    pub fn add(&mut self, location: Location) {
        for existing in &mut self.entries {
            if existing.coordinates == location.coordinates {
                merge_annotations(&mut existing.annotations, &location.annotations);
                return;
            }
        }
        self.entries.push(location);
    }

    pub fn add_all(&mut self, locations: impl IntoIterator<Item = Location>) {
        for location in locations {
            self.add(location);
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.entries.iter().any(|l| l == location)
    }

    pub fn contains_coordinates(&self, coordinates: &Coordinates) -> bool {
        self.entries.iter().any(|l| l.coordinates == *coordinates)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Locations sorted by (real path, filesystem id, access path).
    pub fn to_sorted_vec(&self) -> Vec<Location> {
        let mut out = self.entries.clone();
        out.sort_by(|a, b| {
            (
                &a.coordinates.real_path,
                &a.coordinates.file_system_id,
                &a.access_path,
            )
                .cmp(&(
                    &b.coordinates.real_path,
                    &b.coordinates.file_system_id,
                    &b.access_path,
                ))
        });
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.entries.iter()
    }

    pub fn coordinate_set(&self) -> CoordinateSet {
        CoordinateSet::new(self.entries.iter().map(|l| l.coordinates.clone()))
    }
}

// Only the real paths participate: access paths and filesystem IDs do not
// affect the hash of a location set.
impl Hash for LocationSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        artifact::hash_unordered(&self.coordinate_set().paths(), state);
    }
}

impl FromIterator<Location> for LocationSet {
    fn from_iter<I: IntoIterator<Item = Location>>(iter: I) -> Self {
        LocationSet::new(iter)
    }
}

fn merge_annotations(
    target: &mut BTreeMap<String, String>,
    incoming: &BTreeMap<String, String>,
) {
    for (key, value) in incoming {
        match target.get(key) {
            Some(existing) if existing != value => {
                debug!(
                    key = key.as_str(),
                    kept = existing.as_str(),
                    dropped = value.as_str(),
                    "partial merge of location annotations: conflicting values"
                );
            }
            Some(_) => {}
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// A set of file coordinates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinateSet {
    entries: Vec<Coordinates>,
}

impl CoordinateSet {
    pub fn new(coordinates: impl IntoIterator<Item = Coordinates>) -> Self {
        let mut set = CoordinateSet::default();
        for c in coordinates {
            set.add(c);
        }
        set
    }

    pub fn add(&mut self, coordinates: Coordinates) {
        if !self.entries.contains(&coordinates) {
            self.entries.push(coordinates);
        }
    }

    pub fn contains(&self, coordinates: &Coordinates) -> bool {
        self.entries.contains(coordinates)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Sorted, deduplicated real paths across the set.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.iter().map(|c| c.real_path.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Coordinates sorted by (real path, filesystem id).
    pub fn to_sorted_vec(&self) -> Vec<Coordinates> {
        let mut out = self.entries.clone();
        out.sort();
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coordinates> {
        self.entries.iter()
    }
}

impl Hash for CoordinateSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        artifact::hash_unordered(&self.to_sorted_vec(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::id_of;

    #[test]
    fn test_location_identity_ignores_access_path() {
        let direct = Location::new("/usr/bin/python3.11");
        let via_symlink = Location::virtual_path("/usr/bin/python3.11", "/usr/bin/python3");

        assert_eq!(direct, via_symlink);
        assert_eq!(id_of(&direct), id_of(&via_symlink));
    }

    #[test]
    fn test_location_identity_ignores_annotations() {
        let plain = Location::new("/etc/os-release");
        let annotated = Location::new("/etc/os-release").with_primary_evidence();

        assert_eq!(id_of(&plain), id_of(&annotated));
    }

    #[test]
    fn test_filesystem_id_changes_identity() {
        let lower = Location::new("/bin/sh").with_file_system_id("sha256:aaa");
        let upper = Location::new("/bin/sh").with_file_system_id("sha256:bbb");
        assert_ne!(lower, upper);
    }

    #[test]
    fn test_location_set_dedupes_by_coordinates() {
        let mut set = LocationSet::default();
        set.add(Location::new("/a"));
        set.add(Location::new("/a"));
        set.add(Location::new("/b"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_location_set_merges_across_access_paths() {
        let mut set = LocationSet::default();
        set.add(Location::new("/usr/bin/python3.11").with_annotation("evidence", "primary"));
        set.add(
            Location::virtual_path("/usr/bin/python3.11", "/usr/bin/python3")
                .with_annotation("source", "symlink"),
        );

        // one entry per coordinate set; the symlinked copy only merged
        assert_eq!(set.len(), 1);
        assert!(set.contains(&Location::virtual_path(
            "/usr/bin/python3.11",
            "/usr/bin/python3"
        )));
        let merged = set.to_sorted_vec();
        assert_eq!(merged[0].annotations.get("evidence").unwrap(), "primary");
        assert_eq!(merged[0].annotations.get("source").unwrap(), "symlink");
    }

    #[test]
    fn test_location_set_merges_annotations_first_wins() {
        let mut set = LocationSet::default();
        set.add(Location::new("/a").with_annotation("evidence", "primary"));
        set.add(Location::new("/a").with_annotation("evidence", "supporting"));
        set.add(Location::new("/a").with_annotation("source", "test"));

        let merged = set.to_sorted_vec();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].annotations.get("evidence").unwrap(), "primary");
        assert_eq!(merged[0].annotations.get("source").unwrap(), "test");
    }

    #[test]
    fn test_location_set_hash_depends_only_on_paths() {
        let a = LocationSet::new([
            Location::new("/x").with_annotation("k", "v"),
            Location::new("/y"),
        ]);
        let b = LocationSet::new([
            Location::new("/y"),
            Location::virtual_path("/x", "/linked/x"),
        ]);
        assert_eq!(id_of(&a), id_of(&b));

        let c = LocationSet::new([Location::new("/x"), Location::new("/z")]);
        assert_ne!(id_of(&a), id_of(&c));
    }

    #[test]
    fn test_coordinate_set_paths_sorted_and_deduped() {
        let set = CoordinateSet::new([
            Coordinates::new("/zeta"),
            Coordinates::in_filesystem("/alpha", "layer-1"),
            Coordinates::in_filesystem("/alpha", "layer-2"),
        ]);
        assert_eq!(set.paths(), vec!["/alpha".to_string(), "/zeta".to_string()]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_selection_serde_names() {
        assert_eq!(
            serde_json::to_string(&Selection::OwnedByPackage).unwrap(),
            "\"owned-by-package\""
        );
        assert_eq!(
            serde_json::from_str::<Selection>("\"all\"").unwrap(),
            Selection::All
        );
    }
}
