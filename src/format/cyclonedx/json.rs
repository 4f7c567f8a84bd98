// src/format/cyclonedx/json.rs

//! CycloneDX JSON encoding and decoding

use crate::error::{Error, Result};
use crate::format::cyclonedx::{self, CdxBom, SUPPORTED_VERSIONS};
use crate::format::{DecodeOutcome, FormatDecoder, FormatEncoder, FormatId, ReadSeek};
use crate::sbom::Sbom;
use serde::Deserialize;
use std::io::Write;

pub const FORMAT_ID: &str = "cyclonedx-json";

/// CycloneDX JSON encoder for one version of the standard
pub struct Encoder {
    version: String,
    pub pretty: bool,
}

impl Encoder {
    pub fn new(version: &str) -> Self {
        Encoder {
            version: version.to_string(),
            pretty: false,
        }
    }
}

impl FormatEncoder for Encoder {
    fn id(&self) -> FormatId {
        FormatId::from(FORMAT_ID)
    }

    fn aliases(&self) -> Vec<String> {
        vec!["cyclonedx".to_string(), "cdx".to_string()]
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        let bom = cyclonedx::to_bom(sbom, &self.version);
        if self.pretty {
            serde_json::to_writer_pretty(writer, &bom)?;
        } else {
            serde_json::to_writer(writer, &bom)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct Probe {
    #[serde(rename = "bomFormat")]
    bom_format: String,
    #[serde(rename = "specVersion")]
    spec_version: String,
}

/// CycloneDX JSON decoder (all supported versions)
pub struct Decoder;

impl FormatDecoder for Decoder {
    fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)> {
        let probe: Probe = serde_json::from_reader(reader).ok()?;
        if probe.bom_format != "CycloneDX" {
            return None;
        }
        if SUPPORTED_VERSIONS.contains(&probe.spec_version.as_str()) {
            Some((FormatId::from(FORMAT_ID), probe.spec_version))
        } else {
            Some((FormatId::from(FORMAT_ID), String::new()))
        }
    }

    fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome> {
        let bom: CdxBom = serde_json::from_reader(reader).map_err(|e| Error::Format {
            format: FORMAT_ID.to_string(),
            reason: format!("unable to decode cyclonedx json: {}", e),
        })?;
        let version = bom.spec_version.clone();
        Ok(DecodeOutcome {
            sbom: cyclonedx::from_bom(bom),
            id: FormatId::from(FORMAT_ID),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::{Collection, Package, PackageType};
    use crate::sbom::Artifacts;
    use std::io::Cursor;

    fn sample_sbom() -> Sbom {
        let mut packages = Collection::default();
        packages.add(
            Package {
                name: "requests".to_string(),
                version: "2.31.0".to_string(),
                package_type: PackageType::Python,
                purl: "pkg:pypi/requests@2.31.0".to_string(),
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

    #[test]
    fn test_identify_and_decode() {
        let mut bytes = Vec::new();
        Encoder::new("1.5").encode(&mut bytes, &sample_sbom()).unwrap();

        let mut cursor = Cursor::new(bytes);
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert_eq!(version, "1.5");

        cursor.set_position(0);
        let outcome = Decoder.decode(&mut cursor).unwrap();
        assert_eq!(outcome.sbom.packages_sorted()[0].name, "requests");
        assert_eq!(
            outcome.sbom.packages_sorted()[0].package_type,
            PackageType::Python
        );
    }

    #[test]
    fn test_identify_unsupported_version() {
        let mut cursor = Cursor::new(
            b"{\"bomFormat\": \"CycloneDX\", \"specVersion\": \"0.9\"}".to_vec(),
        );
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert!(version.is_empty());
    }

    #[test]
    fn test_identify_rejects_other_json() {
        let mut cursor = Cursor::new(b"{\"spdxVersion\": \"SPDX-2.3\"}".to_vec());
        assert!(Decoder.identify(&mut cursor).is_none());
    }
}
