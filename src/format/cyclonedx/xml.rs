// src/format/cyclonedx/xml.rs

//! CycloneDX XML encoding and decoding
//!
//! The XML form carries the same BOM model as the JSON form. The spec
//! version is recovered from the `bom` element's namespace.

use crate::error::{Error, Result};
use crate::format::cyclonedx::{
    self, CdxBom, CdxComponent, CdxDependency, CdxLicense, CdxLicenseChoice, CdxMetadata,
    CdxProperty, CdxTool, SUPPORTED_VERSIONS,
};
use crate::format::{DecodeOutcome, FormatDecoder, FormatEncoder, FormatId, ReadSeek};
use crate::sbom::Sbom;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::{BufReader, Write};

pub const FORMAT_ID: &str = "cyclonedx-xml";

const NAMESPACE_PREFIX: &str = "http://cyclonedx.org/schema/bom/";

/// CycloneDX XML encoder for one version of the standard
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
        vec!["xml".to_string()]
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        let bom = cyclonedx::to_bom(sbom, &self.version);
        let mut buffer = Vec::new();
        write_bom(&mut buffer, &bom).map_err(|e| Error::Format {
            format: FORMAT_ID.to_string(),
            reason: e.to_string(),
        })?;
        writer.write_all(&buffer)?;
        Ok(())
    }
}

fn text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> quick_xml::Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_component<W: Write>(
    writer: &mut Writer<W>,
    component: &CdxComponent,
) -> quick_xml::Result<()> {
    let mut start = BytesStart::new("component");
    start.push_attribute(("type", component.component_type.as_str()));
    if !component.bom_ref.is_empty() {
        start.push_attribute(("bom-ref", component.bom_ref.as_str()));
    }
    writer.write_event(Event::Start(start))?;

    text_element(writer, "name", &component.name)?;
    text_element(writer, "version", &component.version)?;

    if !component.licenses.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("licenses")))?;
        for choice in &component.licenses {
            if !choice.expression.is_empty() {
                text_element(writer, "expression", &choice.expression)?;
            } else if let Some(license) = &choice.license {
                writer.write_event(Event::Start(BytesStart::new("license")))?;
                text_element(writer, "id", &license.id)?;
                text_element(writer, "name", &license.name)?;
                writer.write_event(Event::End(BytesEnd::new("license")))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("licenses")))?;
    }

    text_element(writer, "cpe", &component.cpe)?;
    text_element(writer, "purl", &component.purl)?;

    if !component.properties.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("properties")))?;
        for property in &component.properties {
            let mut start = BytesStart::new("property");
            start.push_attribute(("name", property.name.as_str()));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&property.value)))?;
            writer.write_event(Event::End(BytesEnd::new("property")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("properties")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("component")))?;
    Ok(())
}

fn write_bom(buffer: &mut Vec<u8>, bom: &CdxBom) -> quick_xml::Result<()> {
    let mut writer = Writer::new(buffer);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("bom");
    root.push_attribute((
        "xmlns",
        format!("{}{}", NAMESPACE_PREFIX, bom.spec_version).as_str(),
    ));
    if !bom.serial_number.is_empty() {
        root.push_attribute(("serialNumber", bom.serial_number.as_str()));
    }
    root.push_attribute(("version", bom.version.to_string().as_str()));
    writer.write_event(Event::Start(root))?;

    if let Some(metadata) = &bom.metadata {
        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
        text_element(&mut writer, "timestamp", &metadata.timestamp)?;
        if !metadata.tools.is_empty() {
            writer.write_event(Event::Start(BytesStart::new("tools")))?;
            for tool in &metadata.tools {
                writer.write_event(Event::Start(BytesStart::new("tool")))?;
                text_element(&mut writer, "name", &tool.name)?;
                text_element(&mut writer, "version", &tool.version)?;
                writer.write_event(Event::End(BytesEnd::new("tool")))?;
            }
            writer.write_event(Event::End(BytesEnd::new("tools")))?;
        }
        if let Some(component) = &metadata.component {
            write_component(&mut writer, component)?;
        }
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("components")))?;
    for component in &bom.components {
        write_component(&mut writer, component)?;
    }
    writer.write_event(Event::End(BytesEnd::new("components")))?;

    if !bom.dependencies.is_empty() {
        writer.write_event(Event::Start(BytesStart::new("dependencies")))?;
        for dependency in &bom.dependencies {
            let mut start = BytesStart::new("dependency");
            start.push_attribute(("ref", dependency.dependency_ref.as_str()));
            writer.write_event(Event::Start(start))?;
            for depends_on in &dependency.depends_on {
                let mut inner = BytesStart::new("dependency");
                inner.push_attribute(("ref", depends_on.as_str()));
                writer.write_event(Event::Empty(inner))?;
            }
            writer.write_event(Event::End(BytesEnd::new("dependency")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("dependencies")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("bom")))?;
    Ok(())
}

/// CycloneDX XML decoder (all supported versions)
pub struct Decoder;

fn attribute_value(start: &BytesStart, name: &str) -> Option<String> {
    for attribute in start.attributes().flatten() {
        if attribute.key.as_ref() == name.as_bytes() {
            return Some(String::from_utf8_lossy(&attribute.value).into_owned());
        }
    }
    None
}

fn parse_bom(reader: &mut dyn ReadSeek) -> Result<CdxBom> {
    let mut xml = Reader::from_reader(BufReader::new(reader));
    let config = xml.config_mut();
    config.trim_text_start = true;
    config.trim_text_end = true;

    let mut bom = CdxBom::default();
    let mut buffer = Vec::new();
    // element name path from the root down to the current position
    let mut path: Vec<String> = Vec::new();
    let mut in_metadata = false;
    let mut current_component: Option<CdxComponent> = None;
    let mut current_license: Option<CdxLicense> = None;
    let mut current_property: Option<CdxProperty> = None;
    let mut current_tool: Option<CdxTool> = None;
    let mut current_dependency: Option<CdxDependency> = None;
    let mut text = String::new();

    loop {
        match xml.read_event_into(&mut buffer) {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match name.as_str() {
                    "bom" => {
                        bom.bom_format = "CycloneDX".to_string();
                        if let Some(xmlns) = attribute_value(&start, "xmlns") {
                            if let Some(version) = xmlns.strip_prefix(NAMESPACE_PREFIX) {
                                bom.spec_version = version.to_string();
                            }
                        }
                        if let Some(serial) = attribute_value(&start, "serialNumber") {
                            bom.serial_number = serial;
                        }
                        bom.version = attribute_value(&start, "version")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(1);
                    }
                    "metadata" => {
                        in_metadata = true;
                        bom.metadata = Some(CdxMetadata::default());
                    }
                    "component" => {
                        let mut component = CdxComponent {
                            component_type: attribute_value(&start, "type").unwrap_or_default(),
                            ..Default::default()
                        };
                        if let Some(bom_ref) = attribute_value(&start, "bom-ref") {
                            component.bom_ref = bom_ref;
                        }
                        current_component = Some(component);
                    }
                    "license" => current_license = Some(CdxLicense::default()),
                    "property" => {
                        current_property = Some(CdxProperty {
                            name: attribute_value(&start, "name").unwrap_or_default(),
                            value: String::new(),
                        })
                    }
                    "tool" => current_tool = Some(CdxTool::default()),
                    "dependency" => {
                        if let Some(parent) = current_dependency.as_mut() {
                            // nested start-form dependency entries
                            if let Some(reference) = attribute_value(&start, "ref") {
                                parent.depends_on.push(reference);
                            }
                        } else {
                            current_dependency = Some(CdxDependency {
                                dependency_ref: attribute_value(&start, "ref")
                                    .unwrap_or_default(),
                                depends_on: Vec::new(),
                            });
                        }
                    }
                    _ => {}
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Empty(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                if name == "dependency" {
                    if let Some(reference) = attribute_value(&start, "ref") {
                        match current_dependency.as_mut() {
                            Some(dependency) => dependency.depends_on.push(reference),
                            None => bom.dependencies.push(CdxDependency {
                                dependency_ref: reference,
                                depends_on: Vec::new(),
                            }),
                        }
                    }
                }
            }
            Ok(Event::Text(event)) => {
                text = event.unescape().unwrap_or_default().into_owned();
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                path.pop();
                let parent = path.last().map(String::as_str).unwrap_or_default();

                match name.as_str() {
                    "metadata" => in_metadata = false,
                    "timestamp" => {
                        if let Some(metadata) = bom.metadata.as_mut() {
                            metadata.timestamp = text.clone();
                        }
                    }
                    "name" => {
                        if let Some(license) = current_license.as_mut() {
                            license.name = text.clone();
                        } else if let Some(tool) = current_tool.as_mut() {
                            tool.name = text.clone();
                        } else if let Some(component) = current_component.as_mut() {
                            component.name = text.clone();
                        }
                    }
                    "version" => {
                        if let Some(tool) = current_tool.as_mut() {
                            tool.version = text.clone();
                        } else if let Some(component) = current_component.as_mut() {
                            component.version = text.clone();
                        }
                    }
                    "id" => {
                        if let Some(license) = current_license.as_mut() {
                            license.id = text.clone();
                        }
                    }
                    "purl" => {
                        if let Some(component) = current_component.as_mut() {
                            component.purl = text.clone();
                        }
                    }
                    "cpe" => {
                        if let Some(component) = current_component.as_mut() {
                            component.cpe = text.clone();
                        }
                    }
                    "expression" => {
                        if let Some(component) = current_component.as_mut() {
                            component.licenses.push(CdxLicenseChoice {
                                license: None,
                                expression: text.clone(),
                            });
                        }
                    }
                    "license" => {
                        if let (Some(component), Some(license)) =
                            (current_component.as_mut(), current_license.take())
                        {
                            component.licenses.push(CdxLicenseChoice {
                                license: Some(license),
                                expression: String::new(),
                            });
                        }
                    }
                    "property" => {
                        if let (Some(component), Some(mut property)) =
                            (current_component.as_mut(), current_property.take())
                        {
                            property.value = text.clone();
                            component.properties.push(property);
                        }
                    }
                    "tool" => {
                        if let (Some(metadata), Some(tool)) =
                            (bom.metadata.as_mut(), current_tool.take())
                        {
                            metadata.tools.push(tool);
                        }
                    }
                    "component" => {
                        if let Some(component) = current_component.take() {
                            if in_metadata && parent == "metadata" {
                                if let Some(metadata) = bom.metadata.as_mut() {
                                    metadata.component = Some(component);
                                }
                            } else {
                                bom.components.push(component);
                            }
                        }
                    }
                    "dependency" => {
                        // nested start-form entries also end here; only the
                        // outer element closes the record
                        if parent == "dependencies" {
                            if let Some(dependency) = current_dependency.take() {
                                bom.dependencies.push(dependency);
                            }
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Format {
                    format: FORMAT_ID.to_string(),
                    reason: format!("malformed XML: {}", e),
                })
            }
        }
        buffer.clear();
    }

    if bom.spec_version.is_empty() {
        return Err(Error::Format {
            format: FORMAT_ID.to_string(),
            reason: "not a CycloneDX document".to_string(),
        });
    }
    Ok(bom)
}

impl FormatDecoder for Decoder {
    fn identify(&self, reader: &mut dyn ReadSeek) -> Option<(FormatId, String)> {
        let mut xml = Reader::from_reader(BufReader::new(reader));
        let config = xml.config_mut();
        config.trim_text_start = true;
        config.trim_text_end = true;
        let mut buffer = Vec::new();

        // only the root element matters for identification
        loop {
            match xml.read_event_into(&mut buffer) {
                Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                    if start.name().as_ref() != b"bom" {
                        return None;
                    }
                    let xmlns = attribute_value(&start, "xmlns")?;
                    let version = xmlns.strip_prefix(NAMESPACE_PREFIX)?;
                    if SUPPORTED_VERSIONS.contains(&version) {
                        return Some((FormatId::from(FORMAT_ID), version.to_string()));
                    }
                    return Some((FormatId::from(FORMAT_ID), String::new()));
                }
                Ok(Event::Decl(_)) | Ok(Event::Comment(_)) | Ok(Event::Text(_)) => {}
                _ => return None,
            }
        }
    }

    fn decode(&self, reader: &mut dyn ReadSeek) -> Result<DecodeOutcome> {
        let bom = parse_bom(reader)?;
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
    use crate::artifact::Identifiable;
    use crate::file::{Location, LocationSet};
    use crate::pkg::{Collection, Package, PackageType};
    use crate::sbom::Artifacts;
    use std::io::Cursor;

    fn sample_sbom() -> Sbom {
        let mut packages = Collection::default();
        packages.add(
            Package {
                name: "zlib".to_string(),
                version: "1.3".to_string(),
                package_type: PackageType::Rpm,
                purl: "pkg:rpm/fedora/zlib@1.3".to_string(),
                licenses: [crate::file::License::from_value("Zlib")]
                    .into_iter()
                    .collect(),
                locations: LocationSet::new([
                    Location::new("/var/lib/rpm/rpmdb.sqlite").with_primary_evidence(),
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

    fn encode(sbom: &Sbom, version: &str) -> Vec<u8> {
        let mut out = Vec::new();
        Encoder::new(version).encode(&mut out, sbom).unwrap();
        out
    }

    #[test]
    fn test_xml_has_namespace_and_components() {
        let text = String::from_utf8(encode(&sample_sbom(), "1.5")).unwrap();
        assert!(text.contains("http://cyclonedx.org/schema/bom/1.5"));
        assert!(text.contains("<name>zlib</name>"));
        assert!(text.contains("<purl>pkg:rpm/fedora/zlib@1.3</purl>"));
    }

    #[test]
    fn test_identify() {
        let mut cursor = Cursor::new(encode(&sample_sbom(), "1.6"));
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert_eq!(version, "1.6");
    }

    #[test]
    fn test_identify_unsupported_version() {
        let xml = b"<?xml version=\"1.0\"?><bom xmlns=\"http://cyclonedx.org/schema/bom/0.9\"></bom>";
        let mut cursor = Cursor::new(xml.to_vec());
        let (id, version) = Decoder.identify(&mut cursor).unwrap();
        assert_eq!(id.as_str(), FORMAT_ID);
        assert!(version.is_empty());
    }

    #[test]
    fn test_identify_rejects_other_xml() {
        let mut cursor = Cursor::new(b"<?xml version=\"1.0\"?><html></html>".to_vec());
        assert!(Decoder.identify(&mut cursor).is_none());
    }

    #[test]
    fn test_roundtrip_preserves_package() {
        let sbom = sample_sbom();
        let original_id = sbom.packages_sorted()[0].id().clone();

        let mut cursor = Cursor::new(encode(&sbom, "1.5"));
        let outcome = Decoder.decode(&mut cursor).unwrap();

        let packages = outcome.sbom.packages_sorted();
        assert_eq!(packages.len(), 1);
        let package = packages[0];
        assert_eq!(package.name, "zlib");
        assert_eq!(package.version, "1.3");
        assert_eq!(package.package_type, PackageType::Rpm);
        assert_eq!(*package.id(), original_id);
        assert_eq!(package.licenses.summary(), "Zlib");
        assert!(!package.locations.is_empty());
    }
}
