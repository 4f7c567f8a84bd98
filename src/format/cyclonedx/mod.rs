// src/format/cyclonedx/mod.rs

//! CycloneDX document model and bidirectional conversion
//!
//! One BOM shape serves JSON and XML. Identity travels in `bom-ref`,
//! dependency edges in the `dependencies` list, and fields with no
//! CycloneDX slot (package type, language, locations, metadata variant)
//! ride `properties` entries so the decode path can reconstruct them.

pub mod json;
pub mod xml;

use crate::artifact::{ArtifactId, Relationship, RelationshipNode, RelationshipType};
use crate::pkg::{Collection, Cpe, CpeAttributes, CpeSource, Language, Package, PackageMetadata, PackageType};
use crate::sbom::{Artifacts, Descriptor, Sbom};
use crate::source::{Description, SourceMetadata};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// CycloneDX versions with materialized encoders
pub const SUPPORTED_VERSIONS: &[&str] = &["1.4", "1.5", "1.6"];

const PROPERTY_PACKAGE_TYPE: &str = "stocktake:package:type";
const PROPERTY_LANGUAGE: &str = "stocktake:package:language";
const PROPERTY_METADATA: &str = "stocktake:package:metadata";
const PROPERTY_LOCATIONS: &str = "stocktake:package:locations";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxBom {
    #[serde(rename = "bomFormat")]
    pub bom_format: String,
    #[serde(rename = "specVersion")]
    pub spec_version: String,
    #[serde(rename = "serialNumber", default, skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CdxMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<CdxComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<CdxDependency>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<CdxTool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<CdxComponent>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxTool {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxComponent {
    #[serde(rename = "bom-ref", default, skip_serializing_if = "String::is_empty")]
    pub bom_ref: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub purl: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cpe: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<CdxLicenseChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<CdxProperty>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxLicenseChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<CdxLicense>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expression: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxLicense {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CdxProperty {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CdxDependency {
    #[serde(rename = "ref")]
    pub dependency_ref: String,
    #[serde(rename = "dependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

// ---------------------------------------------------------------------------
// encoding

fn bom_ref_of(package: &Package) -> String {
    package.id().to_string()
}

fn source_component(description: &Description) -> CdxComponent {
    let component_type = match description.metadata {
        SourceMetadata::Image { .. } => "container",
        SourceMetadata::File { .. } => "file",
        _ => "application",
    };
    CdxComponent {
        bom_ref: description.id.clone(),
        component_type: component_type.to_string(),
        name: description.name.clone(),
        version: description.version.clone(),
        ..Default::default()
    }
}

/// Build the CycloneDX BOM for one version of the standard.
pub fn to_bom(sbom: &Sbom, spec_version: &str) -> CdxBom {
    let serial_seed = format!("{}:{}", sbom.source.id, sbom.source.name);
    let serial = uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_URL, serial_seed.as_bytes());

    let mut bom = CdxBom {
        bom_format: "CycloneDX".to_string(),
        spec_version: spec_version.to_string(),
        serial_number: format!("urn:uuid:{}", serial),
        version: 1,
        metadata: Some(CdxMetadata {
            timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            tools: vec![CdxTool {
                name: sbom.descriptor.name.clone(),
                version: sbom.descriptor.version.clone(),
            }],
            component: Some(source_component(&sbom.source)),
        }),
        ..Default::default()
    };

    for package in sbom.packages_sorted() {
        let mut properties = vec![
            CdxProperty {
                name: PROPERTY_PACKAGE_TYPE.to_string(),
                value: package.package_type.name().to_string(),
            },
        ];
        if package.language != Language::None {
            properties.push(CdxProperty {
                name: PROPERTY_LANGUAGE.to_string(),
                value: package.language.name().to_string(),
            });
        }
        if let Ok(encoded) = serde_json::to_vec(&package.locations.to_sorted_vec()) {
            properties.push(CdxProperty {
                name: PROPERTY_LOCATIONS.to_string(),
                value: base64::engine::general_purpose::STANDARD.encode(encoded),
            });
        }
        if let Some(metadata) = &package.metadata {
            if let Ok(encoded) = serde_json::to_vec(metadata) {
                properties.push(CdxProperty {
                    name: PROPERTY_METADATA.to_string(),
                    value: base64::engine::general_purpose::STANDARD.encode(encoded),
                });
            }
        }

        let licenses = package
            .licenses
            .iter()
            .map(|license| {
                if license.spdx_expression.is_empty() {
                    CdxLicenseChoice {
                        license: Some(CdxLicense {
                            id: String::new(),
                            name: license.value.clone(),
                        }),
                        expression: String::new(),
                    }
                } else {
                    CdxLicenseChoice {
                        license: None,
                        expression: license.spdx_expression.clone(),
                    }
                }
            })
            .collect();

        bom.components.push(CdxComponent {
            bom_ref: bom_ref_of(package),
            component_type: "library".to_string(),
            name: package.name.clone(),
            version: package.version.clone(),
            purl: package.purl.clone(),
            cpe: package
                .cpes
                .first()
                .map(|c| c.attributes.bind_to_fmt_string())
                .unwrap_or_default(),
            licenses,
            properties,
        });
    }

    // dependency-of edges map onto the dependency graph
    let mut depends: HashMap<String, Vec<String>> = HashMap::new();
    for relationship in sbom.relationships_sorted() {
        if relationship.kind != RelationshipType::DependencyOf {
            continue;
        }
        let (Some(dependency), Some(dependent)) = (
            relationship.from.package_id(),
            relationship.to.package_id(),
        ) else {
            continue;
        };
        depends
            .entry(dependent.to_string())
            .or_default()
            .push(dependency.to_string());
    }
    let mut keys: Vec<String> = depends.keys().cloned().collect();
    keys.sort();
    for key in keys {
        let mut depends_on = depends.remove(&key).unwrap_or_default();
        depends_on.sort();
        depends_on.dedup();
        bom.dependencies.push(CdxDependency {
            dependency_ref: key,
            depends_on,
        });
    }

    bom
}

// ---------------------------------------------------------------------------
// decoding

fn package_type_from_name(name: &str) -> PackageType {
    match name {
        "rpm" => PackageType::Rpm,
        "deb" => PackageType::Deb,
        "alpm" => PackageType::Alpm,
        "java-archive" => PackageType::JavaArchive,
        "npm" => PackageType::Npm,
        "python" => PackageType::Python,
        "go-module" => PackageType::GoModule,
        "linux-kernel-module" => PackageType::LinuxKernelModule,
        "binary" => PackageType::Binary,
        _ => PackageType::Unknown,
    }
}

fn language_from_name(name: &str) -> Language {
    match name {
        "java" => Language::Java,
        "javascript" => Language::Javascript,
        "python" => Language::Python,
        "go" => Language::Go,
        _ => Language::None,
    }
}

/// Convert a decoded BOM into the internal model.
pub fn from_bom(bom: CdxBom) -> Sbom {
    let mut packages = Collection::default();
    let mut package_id_of_ref: HashMap<String, ArtifactId> = HashMap::new();

    for component in &bom.components {
        let mut package = Package {
            name: component.name.clone(),
            version: component.version.clone(),
            purl: component.purl.clone(),
            ..Default::default()
        };

        if !component.cpe.is_empty() {
            if let Some(attributes) = CpeAttributes::parse(&component.cpe) {
                package.cpes.push(Cpe::new(attributes, CpeSource::Declared));
            }
        }

        for choice in &component.licenses {
            if !choice.expression.is_empty() {
                package
                    .licenses
                    .add(crate::file::License::from_value(choice.expression.clone()));
            } else if let Some(license) = &choice.license {
                let value = if license.id.is_empty() {
                    &license.name
                } else {
                    &license.id
                };
                if !value.is_empty() {
                    package
                        .licenses
                        .add(crate::file::License::from_value(value.clone()));
                }
            }
        }

        for property in &component.properties {
            match property.name.as_str() {
                PROPERTY_PACKAGE_TYPE => {
                    package.package_type = package_type_from_name(&property.value)
                }
                PROPERTY_LANGUAGE => package.language = language_from_name(&property.value),
                PROPERTY_LOCATIONS => {
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(&property.value)
                        .ok()
                        .and_then(|bytes| {
                            serde_json::from_slice::<Vec<crate::file::Location>>(&bytes).ok()
                        });
                    if let Some(locations) = decoded {
                        package.locations = locations.into_iter().collect();
                    }
                }
                PROPERTY_METADATA => {
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(&property.value)
                        .ok()
                        .and_then(|bytes| {
                            serde_json::from_slice::<PackageMetadata>(&bytes).ok()
                        });
                    if let Some(metadata) = decoded {
                        package.metadata = Some(metadata);
                    }
                }
                _ => {}
            }
        }

        let bom_ref = component.bom_ref.clone();
        if bom_ref.len() == 16 && bom_ref.chars().all(|c| c.is_ascii_hexdigit()) {
            package.set_raw_id(ArtifactId(bom_ref.clone()));
        } else {
            if !bom_ref.is_empty() {
                warn!(
                    bom_ref = bom_ref.as_str(),
                    "bom-ref carries no fingerprint, identity recomputed"
                );
            }
            package.set_id();
        }
        if !bom_ref.is_empty() {
            package_id_of_ref.insert(bom_ref, package.id().clone());
        }
        packages.add(package);
    }

    let mut relationships = Vec::new();
    for dependency in &bom.dependencies {
        let Some(dependent) = package_id_of_ref.get(&dependency.dependency_ref) else {
            debug!("dependency ref unresolved, skipping");
            continue;
        };
        for depends_on in &dependency.depends_on {
            let Some(provider) = package_id_of_ref.get(depends_on) else {
                continue;
            };
            relationships.push(Relationship::new(
                RelationshipNode::package(provider.clone()),
                RelationshipNode::package(dependent.clone()),
                RelationshipType::DependencyOf,
            ));
        }
    }
    crate::artifact::sort_relationships(&mut relationships);

    let source = bom
        .metadata
        .as_ref()
        .and_then(|m| m.component.as_ref())
        .map(|component| Description {
            id: component.bom_ref.clone(),
            name: component.name.clone(),
            version: component.version.clone(),
            metadata: SourceMetadata::Unknown,
        })
        .unwrap_or_default();

    let descriptor = bom
        .metadata
        .as_ref()
        .and_then(|m| m.tools.first())
        .map(|tool| Descriptor {
            name: tool.name.clone(),
            version: tool.version.clone(),
            configuration: None,
        })
        .unwrap_or_default();

    Sbom {
        artifacts: Artifacts {
            packages,
            ..Default::default()
        },
        relationships,
        source,
        descriptor,
    }
}
