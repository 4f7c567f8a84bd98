// src/format/mod.rs

//! SBOM format identification, encoding, and decoding
//!
//! Encoders and decoders are small capability objects collected behind
//! [`EncoderCollection`] and [`DecoderCollection`]. Encoder lookup accepts
//! `name[@version]` where the name match is case-insensitive and ignores
//! `-`/`_`, and the version matches by glob (`*` wildcards a dotted
//! version); when several encoders match, the highest version wins.
//!
//! Decoding requires a seekable stream: the collection rewinds between
//! candidate decoders, and `identify` never consumes the reader for good.

pub mod cyclonedx;
pub mod github;
pub mod native;
pub mod spdx;
pub mod table;
pub mod text;

use crate::error::{Error, Result};
use crate::sbom::Sbom;
use regex::Regex;
use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use tracing::trace;

/// Identifier of an SBOM format family
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FormatId(pub String);

impl FormatId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FormatId {
    fn from(s: &str) -> Self {
        FormatId(s.to_string())
    }
}

/// Matches any encoder version
pub const ANY_VERSION: &str = "";

/// A seekable byte stream, required by the decode path
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Writes an SBOM in one concrete format version
pub trait FormatEncoder: Send + Sync {
    fn id(&self) -> FormatId;

    /// Alternate names accepted on lookup (`spdx` for `spdx-json`).
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// The format version written; empty when the format is unversioned.
    fn version(&self) -> String;

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()>;
}

/// The result of a successful decode
#[derive(Debug)]
pub struct DecodeOutcome {
    pub sbom: Sbom,
    pub id: FormatId,
    pub version: String,
}

/// Reads an SBOM from one format family
pub trait FormatDecoder: Send + Sync {
    /// Identify the format and version without fully decoding. The version
    /// is empty when the family matched but the version is unsupported.
    fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)>;

    fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome>;
}

/// All encoders known to the engine, one per format version.
pub fn default_encoders() -> Vec<Arc<dyn FormatEncoder>> {
    let mut out: Vec<Arc<dyn FormatEncoder>> = vec![Arc::new(native::Encoder::default())];
    for version in spdx::SUPPORTED_VERSIONS {
        out.push(Arc::new(spdx::json::Encoder::new(version)));
        out.push(Arc::new(spdx::tag_value::Encoder::new(version)));
    }
    for version in cyclonedx::SUPPORTED_VERSIONS {
        out.push(Arc::new(cyclonedx::json::Encoder::new(version)));
        out.push(Arc::new(cyclonedx::xml::Encoder::new(version)));
    }
    out.push(Arc::new(github::Encoder));
    out.push(Arc::new(table::Encoder));
    out.push(Arc::new(text::Encoder));
    out
}

/// All decoders known to the engine.
pub fn default_decoders() -> Vec<Arc<dyn FormatDecoder>> {
    vec![
        Arc::new(native::Decoder),
        Arc::new(spdx::json::Decoder),
        Arc::new(spdx::tag_value::Decoder),
        Arc::new(cyclonedx::json::Decoder),
        Arc::new(cyclonedx::xml::Decoder),
    ]
}

/// A set of encoders with name/version lookup
pub struct EncoderCollection {
    encoders: Vec<Arc<dyn FormatEncoder>>,
}

impl EncoderCollection {
    pub fn new(encoders: Vec<Arc<dyn FormatEncoder>>) -> Self {
        EncoderCollection { encoders }
    }

    pub fn default_collection() -> Self {
        Self::new(default_encoders())
    }

    /// Sorted, deduplicated format IDs in the collection.
    pub fn ids(&self) -> Vec<FormatId> {
        let mut ids: Vec<String> = self.encoders.iter().map(|e| e.id().0).collect();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(FormatId).collect()
    }

    /// All `name@version` strings the collection can produce.
    pub fn name_versions(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .encoders
            .iter()
            .map(|e| {
                if e.version().is_empty() {
                    e.id().to_string()
                } else {
                    format!("{}@{}", e.id(), e.version())
                }
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// All aliases across the collection.
    pub fn aliases(&self) -> Vec<String> {
        let mut out: Vec<String> = self.encoders.iter().flat_map(|e| e.aliases()).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Find the encoder for a name and version request; the highest
    /// matching version wins.
    pub fn get(&self, name: &str, version: &str) -> Option<Arc<dyn FormatEncoder>> {
        trace!(name, version, "looking for matching encoder");
        let wanted = clean_format_name(name);

        let mut best: Option<&Arc<dyn FormatEncoder>> = None;
        for encoder in &self.encoders {
            let mut names = vec![encoder.id().to_string()];
            names.extend(encoder.aliases());
            let name_matches = names.iter().any(|n| clean_format_name(n) == wanted);
            if !name_matches || !version_matches(&encoder.version(), version) {
                continue;
            }
            match best {
                Some(current) if current.version() >= encoder.version() => {}
                _ => best = Some(encoder),
            }
        }
        best.cloned()
    }

    /// Look up by a `name[@version]` string.
    pub fn get_by_string(&self, request: &str) -> Option<Arc<dyn FormatEncoder>> {
        let (name, version) = split_name_version(request);
        self.get(name, version)
    }

    /// Expand a request to encoders: `name@all-versions` (or the bare
    /// keyword as a version) yields every supported version of the family.
    pub fn resolve(&self, request: &str) -> Vec<Arc<dyn FormatEncoder>> {
        let (name, version) = split_name_version(request);
        if version == "all-versions" {
            let wanted = clean_format_name(name);
            let mut out: Vec<Arc<dyn FormatEncoder>> = self
                .encoders
                .iter()
                .filter(|e| {
                    let mut names = vec![e.id().to_string()];
                    names.extend(e.aliases());
                    names.iter().any(|n| clean_format_name(n) == wanted)
                })
                .cloned()
                .collect();
            out.sort_by_key(|e| e.version());
            return out;
        }
        self.get(name, version).into_iter().collect()
    }
}

/// A set of decoders tried in order
pub struct DecoderCollection {
    decoders: Vec<Arc<dyn FormatDecoder>>,
}

impl DecoderCollection {
    pub fn new(decoders: Vec<Arc<dyn FormatDecoder>>) -> Self {
        DecoderCollection { decoders }
    }

    pub fn default_collection() -> Self {
        Self::new(default_decoders())
    }

    /// Identify the format of the stream without decoding it.
    pub fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)> {
        for decoder in &self.decoders {
            if reader.seek(SeekFrom::Start(0)).is_err() {
                return None;
            }
            if let Some((id, version)) = decoder.identify(reader) {
                if !id.is_empty() && !version.is_empty() {
                    return Some((id, version));
                }
            }
        }
        None
    }

    /// Decode the stream with the first decoder that fully recognizes it.
    ///
    /// A family match without a supported version is reported as
    /// [`Error::FormatUnsupported`]; no match at all as
    /// [`Error::FormatUnrecognized`].
    pub fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome> {
        let mut recognized_family: Option<FormatId> = None;

        for decoder in &self.decoders {
            reader.seek(SeekFrom::Start(0))?;
            let Some((id, version)) = decoder.identify(reader) else {
                continue;
            };
            if version.is_empty() {
                if !id.is_empty() {
                    recognized_family = Some(id);
                }
                continue;
            }
            reader.seek(SeekFrom::Start(0))?;
            // a recognized format that fails to decode reports its identity
            return decoder.decode(reader).map_err(|e| match e {
                Error::Format { reason, .. } => Error::Format {
                    format: format!("{}@{}", id, version),
                    reason,
                },
                other => other,
            });
        }

        match recognized_family {
            Some(id) => Err(Error::FormatUnsupported { id: id.0 }),
            None => Err(Error::FormatUnrecognized),
        }
    }
}

/// Lowercase and strip `-`/`_` so `spdx-json`, `SPDX_JSON`, and `spdxjson`
/// all name the same format.
pub fn clean_format_name(name: &str) -> String {
    name.to_lowercase().replace(['-', '_'], "")
}

fn split_name_version(request: &str) -> (&str, &str) {
    match request.split_once('@') {
        Some((name, version)) => (name, version),
        None => (request, ANY_VERSION),
    }
}

/// Version glob matching: `*` wildcards, and a bare prefix matches any
/// more-specific dotted version (`2` matches `2.3`).
pub fn version_matches(version: &str, requested: &str) -> bool {
    if version == ANY_VERSION || requested == ANY_VERSION {
        return true;
    }
    let pattern = requested.replace('.', "\\.").replace('*', ".*");
    let pattern = format!("^{}(\\..*)*$", pattern);
    match Regex::new(&pattern) {
        Ok(regex) => regex.is_match(version),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matching() {
        assert!(version_matches("2.3", "2.3"));
        assert!(version_matches("2.3", "2"));
        assert!(version_matches("2.3", "2.*"));
        assert!(version_matches("2.3", "*"));
        assert!(version_matches("2.3", ""));
        assert!(!version_matches("2.3", "2.2"));
        assert!(!version_matches("1.5", "2.*"));
    }

    #[test]
    fn test_clean_format_name() {
        assert_eq!(clean_format_name("SPDX-JSON"), "spdxjson");
        assert_eq!(clean_format_name("spdx_json"), "spdxjson");
    }

    #[test]
    fn test_encoder_lookup_highest_version_wins() {
        let collection = EncoderCollection::default_collection();

        let encoder = collection.get_by_string("spdx-json").unwrap();
        assert_eq!(encoder.id().as_str(), "spdx-json");
        assert_eq!(encoder.version(), "2.3");

        let encoder = collection.get_by_string("spdx-json@2.2").unwrap();
        assert_eq!(encoder.version(), "2.2");
    }

    #[test]
    fn test_encoder_lookup_by_alias_case_insensitive() {
        let collection = EncoderCollection::default_collection();
        let encoder = collection.get_by_string("CDX").unwrap();
        assert_eq!(encoder.id().as_str(), "cyclonedx-json");

        let encoder = collection.get_by_string("json").unwrap();
        assert_eq!(encoder.id().as_str(), native::FORMAT_ID);
    }

    #[test]
    fn test_all_versions_expansion() {
        let collection = EncoderCollection::default_collection();
        let expanded = collection.resolve("cyclonedx-json@all-versions");
        let versions: Vec<String> = expanded.iter().map(|e| e.version()).collect();
        assert_eq!(versions, vec!["1.4", "1.5", "1.6"]);
    }

    #[test]
    fn test_unknown_name_yields_nothing() {
        let collection = EncoderCollection::default_collection();
        assert!(collection.get_by_string("nonexistent-format").is_none());
        assert!(collection.get_by_string("spdx-json@9.9").is_none());
    }

    #[test]
    fn test_decode_dispatches_to_matching_decoder() {
        use crate::pkg::{Collection, Package, PackageType};
        use crate::sbom::{Artifacts, Sbom};
        use std::io::Cursor;

        let mut packages = Collection::default();
        packages.add(
            Package {
                name: "zlib".to_string(),
                version: "1.3".to_string(),
                package_type: PackageType::Rpm,
                ..Default::default()
            }
            .with_id(),
        );
        let sbom = Sbom {
            artifacts: Artifacts {
                packages,
                ..Default::default()
            },
            ..Default::default()
        };

        let collection = EncoderCollection::default_collection();
        let decoders = DecoderCollection::default_collection();
        for request in ["spdx-json@2.3", "cyclonedx-json@1.5", "cyclonedx-xml@1.6"] {
            let encoder = collection.get_by_string(request).unwrap();
            let mut bytes = Vec::new();
            encoder.encode(&mut bytes, &sbom).unwrap();

            let mut cursor = Cursor::new(bytes);
            let outcome = decoders.decode(&mut cursor).unwrap();
            assert_eq!(
                format!("{}@{}", outcome.id, outcome.version),
                request,
                "request={}",
                request
            );
            assert_eq!(outcome.sbom.packages_sorted()[0].name, "zlib");
        }
    }

    #[test]
    fn test_decode_recognized_format_with_malformed_body() {
        use std::io::Cursor;

        let decoders = DecoderCollection::default_collection();
        let mut cursor =
            Cursor::new(b"{\"spdxVersion\": \"SPDX-2.3\", \"packages\": 42}".to_vec());
        let err = decoders.decode(&mut cursor).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("spdx-json"), "{}", text);
        assert!(text.contains("2.3"), "{}", text);
    }

    #[test]
    fn test_decode_unsupported_version_reports_family() {
        use std::io::Cursor;

        let decoders = DecoderCollection::default_collection();
        let mut cursor = Cursor::new(b"{\"spdxVersion\": \"SPDX-9.9\"}".to_vec());
        let err = decoders.decode(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported { ref id } if id == "spdx-json"));
    }

    #[test]
    fn test_decode_unrecognized_input() {
        use std::io::Cursor;

        let decoders = DecoderCollection::default_collection();
        let mut cursor = Cursor::new(b"<html>nope</html>".to_vec());
        let err = decoders.decode(&mut cursor).unwrap_err();
        assert!(matches!(err, Error::FormatUnrecognized));
    }

    #[test]
    fn test_ids_and_name_versions_sorted() {
        let collection = EncoderCollection::default_collection();
        let ids = collection.ids();
        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(ids, sorted);
        assert!(collection
            .name_versions()
            .contains(&"spdx-json@2.3".to_string()));
    }
}
