// src/pkg/metadata.rs

//! Ecosystem-specific package metadata variants
//!
//! Each package type carries its own metadata shape, modeled as a tagged
//! enum with the `type` field as the discriminator. Variants that record
//! installed files implement [`PackageMetadata::owned_files`], which the
//! relationship synthesizer uses for file-ownership and overlap edges.

use crate::hash::Digest;
use serde::{Deserialize, Serialize};

/// Tagged metadata variant attached to a package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PackageMetadata {
    RpmDbEntry(RpmDbEntry),
    RpmArchive(RpmArchive),
    DpkgDbEntry(DpkgDbEntry),
    AlpmDbEntry(AlpmDbEntry),
    JavaArchive(JavaArchive),
    NpmPackage(NpmPackage),
    PythonPackage(PythonPackage),
    GoModuleEntry(GoModuleEntry),
    LinuxKernelModule(LinuxKernelModule),
    BinarySignature(BinarySignature),
}

impl PackageMetadata {
    /// Paths this package claims to install, used for ownership edges.
    pub fn owned_files(&self) -> Vec<String> {
        let mut paths: Vec<String> = match self {
            PackageMetadata::RpmDbEntry(m) => {
                m.files.iter().map(|f| f.path.clone()).collect()
            }
            PackageMetadata::RpmArchive(m) => {
                m.0.files.iter().map(|f| f.path.clone()).collect()
            }
            PackageMetadata::DpkgDbEntry(m) => {
                m.files.iter().map(|f| f.path.clone()).collect()
            }
            PackageMetadata::AlpmDbEntry(m) => {
                m.files.iter().map(|f| f.path.clone()).collect()
            }
            PackageMetadata::PythonPackage(m) => m
                .files
                .iter()
                .map(|f| m.resolve_record_path(&f.path))
                .collect(),
            _ => Vec::new(),
        };
        paths.retain(|p| !p.is_empty());
        paths.sort();
        paths.dedup();
        paths
    }
}

/// An entry from an installed RPM database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RpmDbEntry {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<i32>,
    #[serde(rename = "architecture", default)]
    pub arch: String,
    #[serde(default)]
    pub release: String,
    #[serde(rename = "sourceRpm", default)]
    pub source_rpm: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub vendor: String,
    #[serde(rename = "modularityLabel", default, skip_serializing_if = "Option::is_none")]
    pub modularity_label: Option<String>,
    #[serde(default)]
    pub files: Vec<RpmFileRecord>,
}

impl RpmDbEntry {
    /// The `[epoch:]version-release` string RPM tooling displays.
    pub fn el_version(&self) -> String {
        let vr = if self.release.is_empty() {
            self.version.clone()
        } else {
            format!("{}-{}", self.version, self.release)
        };
        match self.epoch {
            Some(epoch) => format!("{}:{}", epoch, vr),
            None => vr,
        }
    }
}

/// A file record within an RPM package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RpmFileRecord {
    pub path: String,
    #[serde(default)]
    pub mode: u32,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    #[serde(rename = "userName", default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    #[serde(rename = "groupName", default, skip_serializing_if = "String::is_empty")]
    pub group_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flags: String,
}

/// Metadata from a standalone `.rpm` archive (same shape as a DB entry)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpmArchive(pub RpmDbEntry);

/// A stanza from the dpkg status database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DpkgDbEntry {
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    pub version: String,
    #[serde(rename = "sourceVersion", default, skip_serializing_if = "String::is_empty")]
    pub source_version: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub maintainer: String,
    #[serde(rename = "installedSize", default)]
    pub installed_size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(rename = "preDepends", default, skip_serializing_if = "Vec::is_empty")]
    pub pre_depends: Vec<String>,
    #[serde(default)]
    pub files: Vec<DpkgFileRecord>,
}

/// A file installed by a dpkg package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DpkgFileRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
}

/// An entry from the pacman local database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AlpmDbEntry {
    #[serde(rename = "basepackage", default, skip_serializing_if = "String::is_empty")]
    pub base_package: String,
    pub package: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub packager: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub validation: String,
    #[serde(default)]
    pub files: Vec<AlpmFileRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup: Vec<String>,
}

/// A file installed by a pacman package
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AlpmFileRecord {
    pub path: String,
}

/// Metadata recovered from a Java archive (jar/war/ear)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct JavaArchive {
    #[serde(rename = "virtualPath", default, skip_serializing_if = "String::is_empty")]
    pub virtual_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifest: Vec<(String, String)>,
    #[serde(rename = "pomProperties", default, skip_serializing_if = "Option::is_none")]
    pub pom_properties: Option<PomProperties>,
}

/// Coordinates from a `pom.properties` within a Java archive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PomProperties {
    #[serde(rename = "groupId", default)]
    pub group_id: String,
    #[serde(rename = "artifactId", default)]
    pub artifact_id: String,
    #[serde(default)]
    pub version: String,
}

/// Metadata from a `package.json`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NpmPackage {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub homepage: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub private: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Metadata from an installed Python distribution (`*.dist-info`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PythonPackage {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(rename = "authorEmail", default, skip_serializing_if = "String::is_empty")]
    pub author_email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub platform: String,
    /// The site-packages directory the RECORD paths are relative to
    #[serde(rename = "sitePackagesRootPath", default, skip_serializing_if = "String::is_empty")]
    pub site_packages_root_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PythonFileRecord>,
}

impl PythonPackage {
    /// Resolve a RECORD path (relative to site-packages) to an absolute path.
    pub fn resolve_record_path(&self, path: &str) -> String {
        if path.starts_with('/') || self.site_packages_root_path.is_empty() {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.site_packages_root_path.trim_end_matches('/'),
                path
            )
        }
    }
}

/// A file from a Python distribution RECORD
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PythonFileRecord {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
}

/// A module requirement declared in a `go.mod`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GoModuleEntry {
    #[serde(rename = "modulePath")]
    pub module_path: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub indirect: bool,
}

/// Metadata read from a kernel module's `.modinfo` section
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LinuxKernelModule {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "kernelVersion", default, skip_serializing_if = "String::is_empty")]
    pub kernel_version: String,
    #[serde(rename = "sourceVersion", default, skip_serializing_if = "String::is_empty")]
    pub source_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
}

/// Evidence recorded by the binary classifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BinarySignature {
    /// The classifier rule that matched
    pub classifier: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}
