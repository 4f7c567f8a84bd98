// src/pkg/mod.rs

//! Package model, identity, and collection
//!
//! A [`Package`] is the canonical entity emitted by catalogers. Its identity
//! is a structural hash over all content-defining fields, computed by
//! [`Package::set_id`] after normalization: the purl string is rebuilt from
//! components, CPEs are sorted by source-then-specificity, and locations
//! reduce to their coordinate set. Mutating a package requires recomputing
//! the id; the [`Collection`] does this on insert.

pub mod cataloger;
mod cpe;
mod metadata;
mod purl;

pub use cpe::{
    by_source_then_specificity, hash_cpe_set, merge as merge_cpes, sort_cpes, Cpe, CpeAttributes,
    CpeSource,
};
pub use metadata::{
    AlpmDbEntry, AlpmFileRecord, BinarySignature, DpkgDbEntry, DpkgFileRecord, GoModuleEntry,
    JavaArchive, LinuxKernelModule, NpmPackage, PackageMetadata, PomProperties, PythonFileRecord,
    PythonPackage, RpmArchive, RpmDbEntry, RpmFileRecord,
};
pub use purl::{PackageUrl, QUALIFIER_ARCH, QUALIFIER_DISTRO, QUALIFIER_EPOCH, QUALIFIER_UPSTREAM};

use crate::artifact::{self, ArtifactId, Identifiable};
use crate::file::{License, LocationSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// The ecosystem a package belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    Rpm,
    Deb,
    Alpm,
    JavaArchive,
    Npm,
    Python,
    GoModule,
    LinuxKernelModule,
    Binary,
    #[default]
    Unknown,
}

impl PackageType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
            Self::Deb => "deb",
            Self::Alpm => "alpm",
            Self::JavaArchive => "java-archive",
            Self::Npm => "npm",
            Self::Python => "python",
            Self::GoModule => "go-module",
            Self::LinuxKernelModule => "linux-kernel-module",
            Self::Binary => "binary",
            Self::Unknown => "unknown",
        }
    }
}

/// The language ecosystem of a package, when one applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    Java,
    Javascript,
    Python,
    Go,
    #[default]
    #[serde(rename = "")]
    None,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::Go => "go",
            Self::None => "",
        }
    }
}

/// An ordered, deduplicated set of package licenses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseSet {
    licenses: Vec<License>,
}

impl LicenseSet {
    pub fn new(licenses: impl IntoIterator<Item = License>) -> Self {
        let mut set = LicenseSet::default();
        for license in licenses {
            set.add(license);
        }
        set
    }

    pub fn add(&mut self, license: License) {
        let duplicate = self
            .licenses
            .iter()
            .any(|l| l.value == license.value && l.license_type == license.license_type);
        if !duplicate {
            self.licenses.push(license);
            self.licenses
                .sort_by(|a, b| (&a.value, a.license_type).cmp(&(&b.value, b.license_type)));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &License> {
        self.licenses.iter()
    }

    /// The SPDX expressions (or raw values) joined for display.
    pub fn summary(&self) -> String {
        self.licenses
            .iter()
            .map(|l| {
                if l.spdx_expression.is_empty() {
                    l.value.clone()
                } else {
                    l.spdx_expression.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Hash for LicenseSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let values: Vec<&String> = self.licenses.iter().map(|l| &l.value).collect();
        artifact::hash_unordered(&values, state);
    }
}

impl FromIterator<License> for LicenseSet {
    fn from_iter<I: IntoIterator<Item = License>>(iter: I) -> Self {
        LicenseSet::new(iter)
    }
}

/// A cataloged package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    #[serde(default, skip_serializing)]
    pub(crate) id: ArtifactId,

    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purl: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpes: Vec<Cpe>,
    #[serde(default, skip_serializing_if = "LicenseSet::is_empty")]
    pub licenses: LicenseSet,
    #[serde(skip)]
    pub locations: LocationSet,
    #[serde(default, skip_serializing_if = "is_no_language")]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PackageMetadata>,
}

fn is_no_language(language: &Language) -> bool {
    *language == Language::None
}

impl Package {
    /// Normalize identity-bearing fields and recompute the id.
    ///
    /// Callers are responsible for invoking this after any mutation; the id
    /// is a pure function of the package value.
    pub fn set_id(&mut self) {
        if let Some(parsed) = PackageUrl::parse(&self.purl) {
            self.purl = parsed.to_string();
        }
        sort_cpes(&mut self.cpes);
        self.id = artifact::id_of(&PackageIdentity(self));
    }

    /// A copy of this package with a freshly computed id.
    pub fn with_id(mut self) -> Self {
        self.set_id();
        self
    }

    /// Recompute the id without mutating this package.
    pub fn compute_id(&self) -> ArtifactId {
        let mut normalized = self.clone();
        normalized.set_id();
        normalized.id().clone()
    }

    pub fn id(&self) -> &ArtifactId {
        &self.id
    }

    /// Restore an id captured by an external document (decoder use only).
    pub fn set_raw_id(&mut self, id: ArtifactId) {
        self.id = id;
    }

    /// Paths this package claims to own per its metadata.
    pub fn owned_files(&self) -> Vec<String> {
        self.metadata
            .as_ref()
            .map(|m| m.owned_files())
            .unwrap_or_default()
    }

    /// Total sort key for collection ordering.
    pub fn sort_key(&self) -> (String, String, String, ArtifactId) {
        (
            self.package_type.name().to_string(),
            self.name.clone(),
            self.version.clone(),
            self.id.clone(),
        )
    }
}

// Hashing view over the content-defining fields of a package. Locations
// contribute only their coordinate paths; cpes contribute as a set.
struct PackageIdentity<'a>(&'a Package);

impl Hash for PackageIdentity<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let p = self.0;
        p.name.hash(state);
        p.version.hash(state);
        p.package_type.name().hash(state);
        p.purl.hash(state);
        hash_cpe_set(&p.cpes, state);
        p.licenses.hash(state);
        p.locations.hash(state);
        p.language.name().hash(state);
        match &p.metadata {
            Some(m) => m.hash(state),
            None => 0u8.hash(state),
        }
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Package {}

impl Identifiable for Package {
    fn id(&self) -> ArtifactId {
        self.id.clone()
    }
}

/// A set of packages keyed by id with deterministic iteration order
#[derive(Debug, Clone, Default)]
pub struct Collection {
    by_id: HashMap<ArtifactId, Package>,
}

impl Collection {
    pub fn new(packages: impl IntoIterator<Item = Package>) -> Self {
        let mut collection = Collection::default();
        for package in packages {
            collection.add(package);
        }
        collection
    }

    /// Insert a package, computing its id if unset. Adding a package whose
    /// id is already present merges locations, CPEs, and licenses into the
    /// existing entry (identity is unchanged by construction: the merged
    /// fields hash as sets of what both copies already shared).
    pub fn add(&mut self, mut package: Package) -> ArtifactId {
        if package.id().is_empty() {
            package.set_id();
        }
        let id = package.id().clone();
        match self.by_id.get_mut(&id) {
            Some(existing) => {
                existing
                    .locations
                    .add_all(package.locations.iter().cloned());
                existing.cpes = merge_cpes(&existing.cpes, &package.cpes);
                for license in package.licenses.iter() {
                    existing.licenses.add(license.clone());
                }
            }
            None => {
                self.by_id.insert(id.clone(), package);
            }
        }
        id
    }

    pub fn remove(&mut self, id: &ArtifactId) -> Option<Package> {
        self.by_id.remove(id)
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&Package> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Packages sorted by (type, name, version, id).
    pub fn sorted(&self) -> Vec<&Package> {
        let mut packages: Vec<&Package> = self.by_id.values().collect();
        packages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        packages
    }

    /// Owned sorted packages, consuming the collection.
    pub fn into_sorted(self) -> Vec<Package> {
        let mut packages: Vec<Package> = self.by_id.into_values().collect();
        packages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        packages
    }
}

impl FromIterator<Package> for Collection {
    fn from_iter<I: IntoIterator<Item = Package>>(iter: I) -> Self {
        Collection::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::Location;

    fn sample_package(name: &str, version: &str) -> Package {
        Package {
            name: name.to_string(),
            version: version.to_string(),
            package_type: PackageType::Rpm,
            purl: format!("pkg:rpm/fedora/{}@{}", name, version),
            locations: LocationSet::new([Location::new("/var/lib/rpm/rpmdb.sqlite")]),
            ..Default::default()
        }
        .with_id()
    }

    #[test]
    fn test_id_is_pure_function_of_value() {
        let a = sample_package("bash", "5.2");
        let b = sample_package("bash", "5.2");
        assert_eq!(a.id(), b.id());
        assert_eq!(a.compute_id(), *a.id());

        let c = sample_package("bash", "5.3");
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_mutation_requires_id_recompute() {
        let mut package = sample_package("zsh", "5.9");
        let original = package.id().clone();

        package.version = "5.9.1".to_string();
        assert_eq!(*package.id(), original);

        package.set_id();
        assert_ne!(*package.id(), original);
    }

    #[test]
    fn test_id_ignores_location_annotations() {
        let mut a = sample_package("vim", "9.1");
        let mut b = sample_package("vim", "9.1");
        b.locations = LocationSet::new([
            Location::new("/var/lib/rpm/rpmdb.sqlite").with_primary_evidence()
        ]);
        a.set_id();
        b.set_id();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_purl_is_normalized_on_set_id() {
        let mut package = sample_package("curl", "8.0");
        package.purl = "pkg:RPM/fedora/curl@8.0".to_string();
        package.set_id();
        assert_eq!(package.purl, "pkg:rpm/fedora/curl@8.0");
    }

    #[test]
    fn test_collection_orders_by_type_name_version_id() {
        let mut collection = Collection::default();
        collection.add(sample_package("zlib", "1.3"));
        collection.add(sample_package("bash", "5.2"));
        let mut npm = sample_package("aaa", "1.0");
        npm.package_type = PackageType::Npm;
        npm.set_id();
        collection.add(npm);

        let names: Vec<&str> = collection
            .sorted()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        // npm sorts after rpm by type name
        assert_eq!(names, vec!["bash", "zlib", "aaa"]);
    }

    #[test]
    fn test_collection_merges_same_identity() {
        let mut collection = Collection::default();
        let first = sample_package("bash", "5.2");
        let mut second = sample_package("bash", "5.2");
        second.locations = LocationSet::new([Location::new("/var/lib/rpm/rpmdb.sqlite")]);

        collection.add(first);
        collection.add(second);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn test_license_set_dedupes_and_sorts() {
        let mut set = LicenseSet::default();
        set.add(License::from_value("MIT"));
        set.add(License::from_value("Apache-2.0"));
        set.add(License::from_value("MIT"));

        let values: Vec<&str> = set.iter().map(|l| l.value.as_str()).collect();
        assert_eq!(values, vec!["Apache-2.0", "MIT"]);
    }
}
