// src/format/spdx/json.rs

//! SPDX JSON encoding and decoding

use crate::error::{Error, Result};
use crate::format::spdx::{self, SpdxDocument, SUPPORTED_VERSIONS};
use crate::format::{DecodeOutcome, FormatDecoder, FormatEncoder, FormatId, ReadSeek};
use crate::sbom::Sbom;
use serde::Deserialize;
use std::io::Write;

pub const FORMAT_ID: &str = "spdx-json";

/// SPDX JSON encoder for one version of the standard
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
        vec!["spdx".to_string()]
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        let document = spdx::to_document(sbom, &self.version);
        if self.pretty {
            serde_json::to_writer_pretty(writer, &document)?;
        } else {
            serde_json::to_writer(writer, &document)?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct Probe {
    #[serde(rename = "spdxVersion")]
    spdx_version: String,
}

/// SPDX JSON decoder (all supported versions)
pub struct Decoder;

impl FormatDecoder for Decoder {
    fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)> {
        let probe: Probe = serde_json::from_reader(reader).ok()?;
        let (is_spdx, version) = spdx::parse_spdx_version(&probe.spdx_version);
        if !is_spdx {
            return None;
        }
        if SUPPORTED_VERSIONS.contains(&version.as_str()) {
            Some((FormatId::from(FORMAT_ID), version))
        } else {
            Some((FormatId::from(FORMAT_ID), String::new()))
        }
    }

    fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome> {
        let document: SpdxDocument =
            serde_json::from_reader(reader).map_err(|e| Error::Format {
                format: FORMAT_ID.to_string(),
                reason: format!("unable to decode spdx json: {}", e),
            })?;
        let (_, version) = spdx::parse_spdx_version(&document.spdx_version);
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
                name: "bash".to_string(),
                version: "5.2".to_string(),
                package_type: PackageType::Deb,
                purl: "pkg:deb/debian/bash@5.2".to_string(),
                locations: LocationSet::new([Location::new("/var/lib/dpkg/status")]),
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

    fn encode(sbom: &Sbom, version: &str) -> Vec<u8> {
        let mut out = Vec::new();
        Encoder::new(version).encode(&mut out, sbom).unwrap();
        out
    }

    #[test]
    fn test_identify_versions() {
        let bytes = encode(&sample_sbom(), "2.3");
        let mut cursor = Cursor::new(bytes);
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert_eq!(version, "2.3");
    }

    #[test]
    fn test_identify_unsupported_version_reports_family_only() {
        let mut cursor = Cursor::new(b"{\"spdxVersion\": \"SPDX-9.9\"}".to_vec());
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert!(version.is_empty());
    }

    #[test]
    fn test_identify_rejects_non_spdx() {
        let mut cursor = Cursor::new(b"{\"bomFormat\": \"CycloneDX\"}".to_vec());
        assert!(Decoder.identify(&mut cursor).is_none());
    }

    #[test]
    fn test_decode_roundtrip_keeps_identity() {
        let sbom = sample_sbom();
        let original_id = sbom.packages_sorted()[0].id().clone();

        let bytes = encode(&sbom, "2.2");
        let mut cursor = Cursor::new(bytes);
        let outcome = Decoder.decode(&mut cursor).unwrap();

        assert_eq!(outcome.version, "2.2");
        assert_eq!(*outcome.sbom.packages_sorted()[0].id(), original_id);
    }

    #[test]
    fn test_malformed_body_fails_decode() {
        let mut cursor =
            Cursor::new(b"{\"spdxVersion\": \"SPDX-2.3\", \"packages\": 42}".to_vec());
        let err = Decoder.decode(&mut cursor).unwrap_err();
        assert!(err.to_string().contains("spdx-json"));
    }
}
