// src/format/spdx/tag_value.rs

//! SPDX tag-value encoding and decoding
//!
//! The same document model as the JSON form, serialized as `Tag: value`
//! lines. Decoding is a line scanner: package, file, and relationship
//! blocks are recognized by their leading tags.

use crate::error::{Error, Result};
use crate::format::spdx::{
    self, Checksum, CreationInfo, ExternalRef, ExtractedLicense, SpdxDocument, SpdxFile,
    SpdxPackage, SpdxRelationship, SUPPORTED_VERSIONS,
};
use crate::format::{DecodeOutcome, FormatDecoder, FormatEncoder, FormatId, ReadSeek};
use crate::sbom::Sbom;
use std::io::{BufRead, BufReader, Write};

pub const FORMAT_ID: &str = "spdx-tag-value";

/// SPDX tag-value encoder for one version of the standard
pub struct Encoder {
    version: String,
}

impl Encoder {
    pub fn new(version: &str) -> Self {
        Encoder {
            version: version.to_string(),
        }
    }
}

impl FormatEncoder for Encoder {
    fn id(&self) -> FormatId {
        FormatId::from(FORMAT_ID)
    }

    fn aliases(&self) -> Vec<String> {
        vec!["spdx-tv".to_string()]
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        let document = spdx::to_document(sbom, &self.version);
        write_document(writer, &document)
    }
}

fn write_document(writer: &mut dyn Write, document: &SpdxDocument) -> Result<()> {
    writeln!(writer, "SPDXVersion: {}", document.spdx_version)?;
    writeln!(writer, "DataLicense: {}", document.data_license)?;
    writeln!(writer, "SPDXID: {}", document.spdx_id)?;
    writeln!(writer, "DocumentName: {}", document.name)?;
    writeln!(writer, "DocumentNamespace: {}", document.document_namespace)?;
    for creator in &document.creation_info.creators {
        writeln!(writer, "Creator: {}", creator)?;
    }
    writeln!(writer, "Created: {}", document.creation_info.created)?;

    for package in &document.packages {
        writeln!(writer)?;
        writeln!(writer, "##### Package: {}", package.name)?;
        writeln!(writer)?;
        writeln!(writer, "PackageName: {}", package.name)?;
        writeln!(writer, "SPDXID: {}", package.spdx_id)?;
        if !package.version_info.is_empty() {
            writeln!(writer, "PackageVersion: {}", package.version_info)?;
        }
        writeln!(writer, "PackageDownloadLocation: {}", package.download_location)?;
        if !package.license_concluded.is_empty() {
            writeln!(writer, "PackageLicenseConcluded: {}", package.license_concluded)?;
        }
        if !package.license_declared.is_empty() {
            writeln!(writer, "PackageLicenseDeclared: {}", package.license_declared)?;
        }
        if !package.copyright_text.is_empty() {
            writeln!(writer, "PackageCopyrightText: {}", package.copyright_text)?;
        }
        for external_ref in &package.external_refs {
            writeln!(
                writer,
                "ExternalRef: {} {} {}",
                external_ref.category, external_ref.reference_type, external_ref.locator
            )?;
        }
    }

    if !document.files.is_empty() {
        writeln!(writer)?;
        writeln!(writer, "##### Files")?;
    }
    for file in &document.files {
        writeln!(writer)?;
        writeln!(writer, "FileName: {}", file.file_name)?;
        writeln!(writer, "SPDXID: {}", file.spdx_id)?;
        for checksum in &file.checksums {
            writeln!(writer, "FileChecksum: {}: {}", checksum.algorithm, checksum.value)?;
        }
        if !file.comment.is_empty() {
            writeln!(writer, "FileComment: {}", file.comment)?;
        }
    }

    if !document.extracted_licenses.is_empty() {
        writeln!(writer)?;
    }
    for extracted in &document.extracted_licenses {
        writeln!(writer, "LicenseID: {}", extracted.license_id)?;
        writeln!(writer, "ExtractedText: <text>{}</text>", extracted.extracted_text)?;
    }

    if !document.relationships.is_empty() {
        writeln!(writer)?;
    }
    for relationship in &document.relationships {
        writeln!(
            writer,
            "Relationship: {} {} {}",
            relationship.element_id, relationship.relationship_type, relationship.related_element
        )?;
        if !relationship.comment.is_empty() {
            writeln!(writer, "RelationshipComment: {}", relationship.comment)?;
        }
    }

    Ok(())
}

/// SPDX tag-value decoder (all supported versions)
pub struct Decoder;

// the block a SPDXID line belongs to
enum Section {
    Header,
    Package,
    File,
}

fn parse_document(reader: &mut dyn ReadSeek) -> Result<SpdxDocument> {
    let mut document = SpdxDocument {
        creation_info: CreationInfo::default(),
        ..Default::default()
    };
    let mut section = Section::Header;

    for line in BufReader::new(reader).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let (tag, value) = (tag.trim(), value.trim());

        match tag {
            "SPDXVersion" => document.spdx_version = value.to_string(),
            "DataLicense" => document.data_license = value.to_string(),
            "DocumentName" => document.name = value.to_string(),
            "DocumentNamespace" => document.document_namespace = value.to_string(),
            "Creator" => document.creation_info.creators.push(value.to_string()),
            "Created" => document.creation_info.created = value.to_string(),
            "PackageName" => {
                section = Section::Package;
                document.packages.push(SpdxPackage {
                    name: value.to_string(),
                    ..Default::default()
                });
            }
            "SPDXID" => match section {
                Section::Header => document.spdx_id = value.to_string(),
                Section::Package => {
                    if let Some(package) = document.packages.last_mut() {
                        package.spdx_id = value.to_string();
                    }
                }
                Section::File => {
                    if let Some(file) = document.files.last_mut() {
                        file.spdx_id = value.to_string();
                    }
                }
            },
            "PackageVersion" => {
                if let Some(package) = document.packages.last_mut() {
                    package.version_info = value.to_string();
                }
            }
            "PackageDownloadLocation" => {
                if let Some(package) = document.packages.last_mut() {
                    package.download_location = value.to_string();
                }
            }
            "PackageLicenseConcluded" => {
                if let Some(package) = document.packages.last_mut() {
                    package.license_concluded = value.to_string();
                }
            }
            "PackageLicenseDeclared" => {
                if let Some(package) = document.packages.last_mut() {
                    package.license_declared = value.to_string();
                }
            }
            "PackageCopyrightText" => {
                if let Some(package) = document.packages.last_mut() {
                    package.copyright_text = value.to_string();
                }
            }
            "ExternalRef" => {
                let mut parts = value.splitn(3, ' ');
                let (Some(category), Some(reference_type), Some(locator)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                if let Some(package) = document.packages.last_mut() {
                    package.external_refs.push(ExternalRef {
                        category: category.to_string(),
                        reference_type: reference_type.to_string(),
                        locator: locator.to_string(),
                    });
                }
            }
            "FileName" => {
                section = Section::File;
                document.files.push(SpdxFile {
                    file_name: value.to_string(),
                    ..Default::default()
                });
            }
            "FileChecksum" => {
                let Some((algorithm, checksum)) = value.split_once(':') else {
                    continue;
                };
                if let Some(file) = document.files.last_mut() {
                    file.checksums.push(Checksum {
                        algorithm: algorithm.trim().to_string(),
                        value: checksum.trim().to_string(),
                    });
                }
            }
            "FileComment" => {
                if let Some(file) = document.files.last_mut() {
                    file.comment = value.to_string();
                }
            }
            "LicenseID" => document.extracted_licenses.push(ExtractedLicense {
                license_id: value.to_string(),
                ..Default::default()
            }),
            "ExtractedText" => {
                if let Some(extracted) = document.extracted_licenses.last_mut() {
                    extracted.extracted_text = value
                        .trim_start_matches("<text>")
                        .trim_end_matches("</text>")
                        .to_string();
                }
            }
            "Relationship" => {
                let mut parts = value.splitn(3, ' ');
                let (Some(element), Some(relationship_type), Some(related)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    continue;
                };
                document.relationships.push(SpdxRelationship {
                    element_id: element.to_string(),
                    relationship_type: relationship_type.to_string(),
                    related_element: related.to_string(),
                    comment: String::new(),
                });
            }
            "RelationshipComment" => {
                if let Some(relationship) = document.relationships.last_mut() {
                    relationship.comment = value.to_string();
                }
            }
            _ => {}
        }
    }

    Ok(document)
}

impl FormatDecoder for Decoder {
    fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)> {
        // the version header must appear in the leading lines
        let mut buffered = BufReader::new(reader);
        for _ in 0..10 {
            let mut line = String::new();
            if buffered.read_line(&mut line).ok()? == 0 {
                break;
            }
            let line = line.trim();
            if let Some(raw) = line.strip_prefix("SPDXVersion:") {
                let (is_spdx, version) = spdx::parse_spdx_version(raw.trim());
                if !is_spdx {
                    return None;
                }
                if SUPPORTED_VERSIONS.contains(&version.as_str()) {
                    return Some((FormatId::from(FORMAT_ID), version));
                }
                return Some((FormatId::from(FORMAT_ID), String::new()));
            }
            if line.starts_with('{') {
                return None;
            }
        }
        None
    }

    fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome> {
        let document = parse_document(reader)?;
        let (is_spdx, version) = spdx::parse_spdx_version(&document.spdx_version);
        if !is_spdx {
            return Err(Error::Format {
                format: FORMAT_ID.to_string(),
                reason: "missing SPDXVersion header".to_string(),
            });
        }
        Ok(DecodeOutcome {
            sbom: spdx::from_document(document),
            id: FormatId::from(FORMAT_ID),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Identifiable;
    use crate::file::{Location, LocationSet};
    use crate::pkg::{Collection, Package, PackageType};
    use crate::sbom::Artifacts;
    use std::io::Cursor;

    fn sample_sbom() -> Sbom {
        let mut packages = Collection::default();
        packages.add(
            Package {
                name: "zstd".to_string(),
                version: "1.5.5".to_string(),
                package_type: PackageType::Alpm,
                purl: "pkg:alpm/arch/zstd@1.5.5".to_string(),
                locations: LocationSet::new([
                    Location::new("/var/lib/pacman/local/zstd-1.5.5-1/desc")
                        .with_primary_evidence(),
                ]),
                ..Default::default()
            }
            .with_id(),
        );
        Sbom {
            artifacts: Artifacts {
                packages,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn encode(sbom: &Sbom) -> Vec<u8> {
        let mut out = Vec::new();
        Encoder::new("2.3").encode(&mut out, sbom).unwrap();
        out
    }

    #[test]
    fn test_header_lines_written() {
        let text = String::from_utf8(encode(&sample_sbom())).unwrap();
        assert!(text.starts_with("SPDXVersion: SPDX-2.3\n"));
        assert!(text.contains("DataLicense: CC0-1.0"));
        assert!(text.contains("PackageName: zstd"));
        assert!(text.contains("PackageVersion: 1.5.5"));
    }

    #[test]
    fn test_identify() {
        let mut cursor = Cursor::new(encode(&sample_sbom()));
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert_eq!(version, "2.3");
    }

    #[test]
    fn test_identify_rejects_json() {
        let mut cursor = Cursor::new(b"{\"spdxVersion\": \"SPDX-2.3\"}".to_vec());
        assert!(Decoder.identify(&mut cursor).is_none());
    }

    #[test]
    fn test_roundtrip_preserves_package_and_identity() {
        let sbom = sample_sbom();
        let original_id = sbom.packages_sorted()[0].id().clone();

        let mut cursor = Cursor::new(encode(&sbom));
        let outcome = Decoder.decode(&mut cursor).unwrap();

        let packages = outcome.sbom.packages_sorted();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "zstd");
        assert_eq!(packages[0].purl, "pkg:alpm/arch/zstd@1.5.5");
        assert_eq!(*packages[0].id(), original_id);
        // evidence locations survive through the extension reference
        assert!(!packages[0].locations.is_empty());
    }
}
