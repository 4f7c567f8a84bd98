// src/format/spdx/mod.rs

//! SPDX document model and bidirectional conversion
//!
//! One document shape serves both serializations (JSON and tag-value);
//! the version only changes the `spdxVersion` header. Identity travels in
//! SPDX element IDs (the 16-hex fingerprint is the ID suffix), ecosystem
//! metadata rides an `OTHER` external reference so the decode path can
//! reconstruct it, and the two relationship kinds SPDX has no name for map
//! to `OTHER` with a comment annotation.

pub mod json;
pub mod tag_value;

use crate::artifact::{ArtifactId, Identifiable, Relationship, RelationshipNode, RelationshipType};
use crate::file::{Coordinates, Digest, License};
use crate::pkg::{Collection, Cpe, CpeAttributes, CpeSource, Language, Package, PackageMetadata, PackageType};
use crate::sbom::{Artifacts, Descriptor, Sbom};
use crate::source::Description;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// SPDX versions with materialized encoders
pub const SUPPORTED_VERSIONS: &[&str] = &["2.2", "2.3"];

pub const DOCUMENT_ID: &str = "SPDXRef-DOCUMENT";
const NOASSERTION: &str = "NOASSERTION";

/// Comment markers for relationship kinds SPDX cannot express directly
pub const EVIDENT_BY_COMMENT: &str = "EVIDENT_BY";
pub const OWNERSHIP_BY_FILE_OVERLAP_COMMENT: &str = "OWNERSHIP_BY_FILE_OVERLAP";

/// External reference type carrying the native package extension
const EXTENSION_REF_TYPE: &str = "stocktake:package:extension";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpdxDocument {
    #[serde(rename = "spdxVersion")]
    pub spdx_version: String,
    #[serde(rename = "dataLicense")]
    pub data_license: String,
    #[serde(rename = "SPDXID")]
    pub spdx_id: String,
    pub name: String,
    #[serde(rename = "documentNamespace")]
    pub document_namespace: String,
    #[serde(rename = "creationInfo")]
    pub creation_info: CreationInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<SpdxPackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SpdxFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<SpdxRelationship>,
    #[serde(
        rename = "hasExtractedLicensingInfos",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub extracted_licenses: Vec<ExtractedLicense>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreationInfo {
    pub created: String,
    #[serde(default)]
    pub creators: Vec<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpdxPackage {
    #[serde(rename = "SPDXID")]
    pub spdx_id: String,
    pub name: String,
    #[serde(rename = "versionInfo", default, skip_serializing_if = "String::is_empty")]
    pub version_info: String,
    #[serde(rename = "downloadLocation")]
    pub download_location: String,
    #[serde(rename = "licenseConcluded", default, skip_serializing_if = "String::is_empty")]
    pub license_concluded: String,
    #[serde(rename = "licenseDeclared", default, skip_serializing_if = "String::is_empty")]
    pub license_declared: String,
    #[serde(rename = "copyrightText", default, skip_serializing_if = "String::is_empty")]
    pub copyright_text: String,
    #[serde(rename = "externalRefs", default, skip_serializing_if = "Vec::is_empty")]
    pub external_refs: Vec<ExternalRef>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExternalRef {
    #[serde(rename = "referenceCategory")]
    pub category: String,
    #[serde(rename = "referenceType")]
    pub reference_type: String,
    #[serde(rename = "referenceLocator")]
    pub locator: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpdxFile {
    #[serde(rename = "SPDXID")]
    pub spdx_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checksums: Vec<Checksum>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: String,
    #[serde(rename = "checksumValue")]
    pub value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpdxRelationship {
    #[serde(rename = "spdxElementId")]
    pub element_id: String,
    #[serde(rename = "relatedSpdxElement")]
    pub related_element: String,
    #[serde(rename = "relationshipType")]
    pub relationship_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExtractedLicense {
    #[serde(rename = "licenseId")]
    pub license_id: String,
    #[serde(rename = "extractedText")]
    pub extracted_text: String,
}

/// Native fields with no SPDX slot, carried as an external reference
#[derive(Debug, Default, Serialize, Deserialize)]
struct PackageExtension {
    #[serde(rename = "type")]
    package_type: PackageType,
    #[serde(default)]
    language: Language,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<crate::file::Location>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cpes: Vec<Cpe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<PackageMetadata>,
}

// ---------------------------------------------------------------------------
// encoding: internal model to document

fn sanitize_spdx_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

pub(crate) fn package_spdx_id(package: &Package) -> String {
    format!(
        "SPDXRef-Package-{}-{}-{}",
        sanitize_spdx_id(package.package_type.name()),
        sanitize_spdx_id(&package.name),
        package.id()
    )
}

pub(crate) fn file_spdx_id(coordinates: &Coordinates) -> String {
    format!("SPDXRef-File-{}", coordinates.id())
}

fn license_field(licenses: &crate::pkg::LicenseSet) -> (String, Vec<ExtractedLicense>) {
    if licenses.is_empty() {
        return (NOASSERTION.to_string(), Vec::new());
    }
    let mut parts = Vec::new();
    let mut extracted = Vec::new();
    for license in licenses.iter() {
        if license.spdx_expression.is_empty() {
            let id = format!("LicenseRef-{}", sanitize_spdx_id(&license.value));
            extracted.push(ExtractedLicense {
                license_id: id.clone(),
                extracted_text: license.value.clone(),
            });
            parts.push(id);
        } else {
            parts.push(license.spdx_expression.clone());
        }
    }
    (parts.join(" AND "), extracted)
}

/// Build the SPDX document for one version of the standard.
pub fn to_document(sbom: &Sbom, spdx_version: &str) -> SpdxDocument {
    let name = if sbom.source.name.is_empty() {
        "unknown".to_string()
    } else {
        sbom.source.name.clone()
    };
    let namespace_seed = format!("{}-{}", sbom.source.id, name);
    let namespace_uuid =
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, namespace_seed.as_bytes());
    let document_namespace = format!(
        "https://stocktake.dev/spdx/{}-{}",
        sanitize_spdx_id(&name),
        namespace_uuid
    );

    let mut document = SpdxDocument {
        spdx_version: format!("SPDX-{}", spdx_version),
        data_license: "CC0-1.0".to_string(),
        spdx_id: DOCUMENT_ID.to_string(),
        name,
        document_namespace,
        creation_info: CreationInfo {
            created: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            creators: vec![format!(
                "Tool: {}-{}",
                sbom.descriptor.name, sbom.descriptor.version
            )],
        },
        ..Default::default()
    };

    let mut spdx_id_of_package: HashMap<ArtifactId, String> = HashMap::new();
    for package in sbom.packages_sorted() {
        let spdx_id = package_spdx_id(package);
        spdx_id_of_package.insert(package.id().clone(), spdx_id.clone());

        let (license_text, mut extracted) = license_field(&package.licenses);
        document.extracted_licenses.append(&mut extracted);

        let mut external_refs = Vec::new();
        for cpe in &package.cpes {
            external_refs.push(ExternalRef {
                category: "SECURITY".to_string(),
                reference_type: "cpe23Type".to_string(),
                locator: cpe.attributes.bind_to_fmt_string(),
            });
        }
        if !package.purl.is_empty() {
            external_refs.push(ExternalRef {
                category: "PACKAGE-MANAGER".to_string(),
                reference_type: "purl".to_string(),
                locator: package.purl.clone(),
            });
        }
        let extension = PackageExtension {
            package_type: package.package_type,
            language: package.language,
            locations: package.locations.to_sorted_vec(),
            cpes: package.cpes.clone(),
            metadata: package.metadata.clone(),
        };
        if let Ok(encoded) = serde_json::to_vec(&extension) {
            external_refs.push(ExternalRef {
                category: "OTHER".to_string(),
                reference_type: EXTENSION_REF_TYPE.to_string(),
                locator: base64::engine::general_purpose::STANDARD.encode(encoded),
            });
        }

        document.packages.push(SpdxPackage {
            spdx_id: spdx_id.clone(),
            name: package.name.clone(),
            version_info: package.version.clone(),
            download_location: NOASSERTION.to_string(),
            license_concluded: NOASSERTION.to_string(),
            license_declared: license_text,
            copyright_text: NOASSERTION.to_string(),
            external_refs,
        });

        document.relationships.push(SpdxRelationship {
            element_id: DOCUMENT_ID.to_string(),
            related_element: spdx_id,
            relationship_type: "DESCRIBES".to_string(),
            comment: String::new(),
        });
    }

    let mut spdx_id_of_file: HashMap<Coordinates, String> = HashMap::new();
    for coordinates in sbom.all_coordinates().to_sorted_vec() {
        let spdx_id = file_spdx_id(&coordinates);
        spdx_id_of_file.insert(coordinates.clone(), spdx_id.clone());

        let mut checksums: Vec<Checksum> = sbom
            .artifacts
            .file_digests
            .get(&coordinates)
            .map(|digests| {
                digests
                    .iter()
                    .map(|d| Checksum {
                        algorithm: d.algorithm.to_uppercase(),
                        value: d.value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        checksums.sort_by(|a, b| a.algorithm.cmp(&b.algorithm));

        document.files.push(SpdxFile {
            spdx_id,
            file_name: coordinates.real_path.clone(),
            checksums,
            comment: if coordinates.file_system_id.is_empty() {
                String::new()
            } else {
                format!("layerID: {}", coordinates.file_system_id)
            },
        });
    }

    for relationship in sbom.relationships_sorted() {
        let resolve = |node: &RelationshipNode| -> Option<String> {
            match node {
                RelationshipNode::Package { id } => spdx_id_of_package.get(id).cloned(),
                RelationshipNode::File { coordinates } => {
                    spdx_id_of_file.get(coordinates).cloned()
                }
            }
        };
        let (Some(element_id), Some(related_element)) =
            (resolve(&relationship.from), resolve(&relationship.to))
        else {
            debug!("relationship endpoint missing from document, skipping");
            continue;
        };

        let (relationship_type, comment) = match relationship.kind {
            RelationshipType::Contains => ("CONTAINS", ""),
            RelationshipType::DependencyOf => ("DEPENDENCY_OF", ""),
            RelationshipType::DescribedBy => ("DESCRIBED_BY", ""),
            RelationshipType::EvidentBy => ("OTHER", EVIDENT_BY_COMMENT),
            RelationshipType::OwnershipByFileOverlap => {
                ("OTHER", OWNERSHIP_BY_FILE_OVERLAP_COMMENT)
            }
        };
        document.relationships.push(SpdxRelationship {
            element_id,
            related_element,
            relationship_type: relationship_type.to_string(),
            comment: comment.to_string(),
        });
    }

    document
}

// ---------------------------------------------------------------------------
// decoding: document to internal model

/// Extract the trailing 16-hex fingerprint from an SPDX element ID.
fn id_from_spdx_id(spdx_id: &str) -> Option<ArtifactId> {
    let tail = spdx_id.rsplit('-').next()?;
    if tail.len() == 16 && tail.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(ArtifactId(tail.to_string()))
    } else {
        None
    }
}

fn package_type_from_purl(purl: &str) -> PackageType {
    match crate::pkg::PackageUrl::parse(purl).map(|p| p.package_type) {
        Some(t) => match t.as_str() {
            "rpm" => PackageType::Rpm,
            "deb" => PackageType::Deb,
            "alpm" => PackageType::Alpm,
            "maven" => PackageType::JavaArchive,
            "npm" => PackageType::Npm,
            "pypi" => PackageType::Python,
            "golang" => PackageType::GoModule,
            _ => PackageType::Unknown,
        },
        None => PackageType::Unknown,
    }
}

/// Convert a decoded SPDX document into the internal model.
pub fn from_document(document: SpdxDocument) -> Sbom {
    let mut packages = Collection::default();
    let mut package_id_of_spdx: HashMap<String, ArtifactId> = HashMap::new();

    for spdx_package in &document.packages {
        let mut package = Package {
            name: spdx_package.name.clone(),
            version: spdx_package.version_info.clone(),
            ..Default::default()
        };

        for external_ref in &spdx_package.external_refs {
            match external_ref.reference_type.as_str() {
                "purl" => package.purl = external_ref.locator.clone(),
                "cpe23Type" => {
                    if let Some(attributes) = CpeAttributes::parse(&external_ref.locator) {
                        let duplicate = package
                            .cpes
                            .iter()
                            .any(|c| c.attributes == attributes);
                        if !duplicate {
                            package.cpes.push(Cpe::new(attributes, CpeSource::Declared));
                        }
                    }
                }
                EXTENSION_REF_TYPE => {
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(&external_ref.locator)
                        .ok()
                        .and_then(|bytes| {
                            serde_json::from_slice::<PackageExtension>(&bytes).ok()
                        });
                    if let Some(extension) = decoded {
                        package.package_type = extension.package_type;
                        package.language = extension.language;
                        package.locations = extension.locations.into_iter().collect();
                        package.cpes = extension.cpes;
                        package.metadata = extension.metadata;
                    }
                }
                _ => {}
            }
        }
        if package.package_type == PackageType::Unknown {
            package.package_type = package_type_from_purl(&package.purl);
        }

        if spdx_package.license_declared != NOASSERTION
            && !spdx_package.license_declared.is_empty()
        {
            for part in spdx_package.license_declared.split(" AND ") {
                let license = if let Some(raw) = part.strip_prefix("LicenseRef-") {
                    // recover the raw text from the extracted licensing info
                    document
                        .extracted_licenses
                        .iter()
                        .find(|e| e.license_id.trim_start_matches("LicenseRef-") == raw)
                        .map(|e| License::from_value(e.extracted_text.clone()))
                        .unwrap_or_else(|| License::from_value(part))
                } else {
                    License::from_value(part)
                };
                package.licenses.add(license);
            }
        }

        match id_from_spdx_id(&spdx_package.spdx_id) {
            Some(id) => package.set_raw_id(id),
            None => {
                warn!(
                    spdx_id = spdx_package.spdx_id.as_str(),
                    "SPDXID carries no fingerprint, identity recomputed"
                );
                package.set_id();
            }
        }
        package_id_of_spdx.insert(spdx_package.spdx_id.clone(), package.id().clone());
        packages.add(package);
    }

    let mut artifacts = Artifacts {
        packages,
        ..Default::default()
    };
    let mut coordinates_of_spdx: HashMap<String, Coordinates> = HashMap::new();
    for file in &document.files {
        let mut coordinates = Coordinates::new(file.file_name.clone());
        if let Some(layer) = file.comment.strip_prefix("layerID: ") {
            coordinates.file_system_id = layer.to_string();
        }
        coordinates_of_spdx.insert(file.spdx_id.clone(), coordinates.clone());
        if !file.checksums.is_empty() {
            artifacts.file_digests.insert(
                coordinates,
                file.checksums
                    .iter()
                    .map(|c| Digest::new(c.algorithm.to_lowercase(), c.value.clone()))
                    .collect(),
            );
        }
    }

    let mut relationships = Vec::new();
    for relationship in &document.relationships {
        if relationship.element_id == DOCUMENT_ID {
            // document DESCRIBES edges are regenerated on encode
            continue;
        }
        let kind = match (
            relationship.relationship_type.as_str(),
            relationship.comment.as_str(),
        ) {
            ("CONTAINS", _) => RelationshipType::Contains,
            ("DEPENDENCY_OF", _) => RelationshipType::DependencyOf,
            ("DESCRIBED_BY", _) => RelationshipType::DescribedBy,
            ("OTHER", EVIDENT_BY_COMMENT) => RelationshipType::EvidentBy,
            ("OTHER", OWNERSHIP_BY_FILE_OVERLAP_COMMENT) => {
                RelationshipType::OwnershipByFileOverlap
            }
            (other, _) => {
                debug!(relationship_type = other, "unmapped SPDX relationship skipped");
                continue;
            }
        };

        let resolve = |spdx_id: &str| -> Option<RelationshipNode> {
            if let Some(package_id) = package_id_of_spdx.get(spdx_id) {
                return Some(RelationshipNode::package(package_id.clone()));
            }
            coordinates_of_spdx
                .get(spdx_id)
                .map(|c| RelationshipNode::file(c.clone()))
        };
        let (Some(from), Some(to)) = (
            resolve(&relationship.element_id),
            resolve(&relationship.related_element),
        ) else {
            debug!("SPDX relationship endpoint unresolved, skipping");
            continue;
        };
        relationships.push(Relationship::new(from, to, kind));
    }
    crate::artifact::sort_relationships(&mut relationships);

    Sbom {
        artifacts,
        relationships,
        source: Description {
            id: String::new(),
            name: document.name.clone(),
            version: String::new(),
            metadata: Default::default(),
        },
        descriptor: Descriptor::default(),
    }
}

/// Parse `SPDX-2.3` into a known version string.
pub fn parse_spdx_version(raw: &str) -> (bool, String) {
    let Some(version) = raw.strip_prefix("SPDX-") else {
        return (false, String::new());
    };
    (true, version.to_string())
}
