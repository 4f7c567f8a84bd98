// src/format/native.rs

//! The native JSON format
//!
//! The authoritative representation: every field of the internal model has
//! a slot in the document, so encode → decode → encode is byte-exact after
//! the canonical sort. All maps are emitted as sorted arrays keyed by
//! coordinates, and package ids travel with their packages so decoded
//! documents keep the identities they were written with.

use crate::artifact::Relationship;
use crate::error::{Error, Result};
use crate::file::{Coordinates, Digest, Executable, License, Location, Metadata};
use crate::format::{DecodeOutcome, FormatDecoder, FormatEncoder, FormatId, ReadSeek};
use crate::linux::Release;
use crate::pkg::{Collection, Cpe, Language, LicenseSet, Package, PackageMetadata, PackageType};
use crate::sbom::{Artifacts, Descriptor, Sbom};
use crate::source::Description;
use serde::{Deserialize, Serialize};

pub const FORMAT_ID: &str = "stocktake-json";

/// The document schema version this build writes
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize)]
struct Document {
    artifacts: Vec<PackageRecord>,
    #[serde(rename = "artifactRelationships")]
    relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    distro: Option<Release>,
    source: Description,
    descriptor: Descriptor,
    schema: Schema,
}

#[derive(Debug, Serialize, Deserialize)]
struct Schema {
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct PackageRecord {
    id: String,
    name: String,
    version: String,
    #[serde(rename = "type")]
    package_type: PackageType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    locations: Vec<Location>,
    #[serde(default, skip_serializing_if = "LicenseSet::is_empty")]
    licenses: LicenseSet,
    #[serde(default, skip_serializing_if = "is_no_language")]
    language: Language,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    cpes: Vec<Cpe>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    purl: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<PackageMetadata>,
}

fn is_no_language(language: &Language) -> bool {
    *language == Language::None
}

#[derive(Debug, Serialize, Deserialize)]
struct FileRecord {
    id: String,
    location: Coordinates,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    digests: Vec<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    contents: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    licenses: Vec<License>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    executable: Option<Executable>,
}

fn to_document(sbom: &Sbom) -> Document {
    use crate::artifact::Identifiable;

    let artifacts = sbom
        .packages_sorted()
        .into_iter()
        .map(|package| PackageRecord {
            id: package.id().to_string(),
            name: package.name.clone(),
            version: package.version.clone(),
            package_type: package.package_type,
            locations: package.locations.to_sorted_vec(),
            licenses: package.licenses.clone(),
            language: package.language,
            cpes: package.cpes.clone(),
            purl: package.purl.clone(),
            metadata: package.metadata.clone(),
        })
        .collect();

    let mut files = Vec::new();
    for coordinates in sbom.all_coordinates().to_sorted_vec() {
        let metadata = sbom.artifacts.file_metadata.get(&coordinates).cloned();
        let mut digests = sbom
            .artifacts
            .file_digests
            .get(&coordinates)
            .cloned()
            .unwrap_or_default();
        digests.sort();
        let contents = sbom.artifacts.file_contents.get(&coordinates).cloned();
        let mut licenses = sbom
            .artifacts
            .file_licenses
            .get(&coordinates)
            .cloned()
            .unwrap_or_default();
        licenses.sort_by(|a, b| a.value.cmp(&b.value));
        let executable = sbom.artifacts.executables.get(&coordinates).cloned();

        if metadata.is_none()
            && digests.is_empty()
            && contents.is_none()
            && licenses.is_empty()
            && executable.is_none()
        {
            continue;
        }

        files.push(FileRecord {
            id: coordinates.id().to_string(),
            location: coordinates,
            metadata,
            digests,
            contents,
            licenses,
            executable,
        });
    }

    let relationships = sbom
        .relationships_sorted()
        .into_iter()
        .cloned()
        .collect();

    Document {
        artifacts,
        relationships,
        files,
        distro: sbom.artifacts.linux_distribution.clone(),
        source: sbom.source.clone(),
        descriptor: sbom.descriptor.clone(),
        schema: Schema {
            version: SCHEMA_VERSION.to_string(),
        },
    }
}

fn from_document(document: Document) -> Sbom {
    let mut packages = Collection::default();
    for record in document.artifacts {
        let mut package = Package {
            name: record.name,
            version: record.version,
            package_type: record.package_type,
            purl: record.purl,
            cpes: record.cpes,
            licenses: record.licenses,
            locations: record.locations.into_iter().collect(),
            language: record.language,
            metadata: record.metadata,
            ..Default::default()
        };
        // identities travel with the document rather than being recomputed,
        // which keeps relationship endpoints valid
        package.set_raw_id(crate::artifact::ArtifactId(record.id));
        packages.add(package);
    }

    let mut artifacts = Artifacts {
        packages,
        linux_distribution: document.distro,
        ..Default::default()
    };
    for file in document.files {
        if let Some(metadata) = file.metadata {
            artifacts.file_metadata.insert(file.location.clone(), metadata);
        }
        if !file.digests.is_empty() {
            artifacts.file_digests.insert(file.location.clone(), file.digests);
        }
        if let Some(contents) = file.contents {
            artifacts.file_contents.insert(file.location.clone(), contents);
        }
        if !file.licenses.is_empty() {
            artifacts.file_licenses.insert(file.location.clone(), file.licenses);
        }
        if let Some(executable) = file.executable {
            artifacts.executables.insert(file.location.clone(), executable);
        }
    }

    Sbom {
        artifacts,
        relationships: document.relationships,
        source: document.source,
        descriptor: document.descriptor,
    }
}

/// Native format encoder
#[derive(Default)]
pub struct Encoder {
    pub pretty: bool,
}

impl FormatEncoder for Encoder {
    fn id(&self) -> FormatId {
        FormatId::from(FORMAT_ID)
    }

    fn aliases(&self) -> Vec<String> {
        vec!["json".to_string()]
    }

    fn version(&self) -> String {
        SCHEMA_VERSION.to_string()
    }

    fn encode(&self, writer: &mut dyn std::io::Write, sbom: &Sbom) -> Result<()> {
        let document = to_document(sbom);
        if self.pretty {
            serde_json::to_writer_pretty(writer, &document)?;
        } else {
            serde_json::to_writer(writer, &document)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Probe {
    schema: Schema,
    #[allow(dead_code)]
    descriptor: Descriptor,
}

/// Native format decoder
pub struct Decoder;

impl FormatDecoder for Decoder {
    fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)> {
        let probe: Probe = serde_json::from_reader(reader).ok()?;
        if probe.schema.version == SCHEMA_VERSION {
            Some((FormatId::from(FORMAT_ID), probe.schema.version))
        } else {
            // family recognized, version unsupported
            Some((FormatId::from(FORMAT_ID), String::new()))
        }
    }

    fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome> {
        let document: Document = serde_json::from_reader(reader).map_err(|e| Error::Format {
            format: format!("{}@{}", FORMAT_ID, SCHEMA_VERSION),
            reason: format!("unable to decode document: {}", e),
        })?;
        let version = document.schema.version.clone();
        Ok(DecodeOutcome {
            sbom: from_document(document),
            id: FormatId::from(FORMAT_ID),
            version,
        })
    }
}
