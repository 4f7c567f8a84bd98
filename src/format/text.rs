// src/format/text.rs

//! Plain text output (encode only)

use crate::error::Result;
use crate::format::{FormatEncoder, FormatId};
use crate::sbom::Sbom;
use std::io::Write;

pub const FORMAT_ID: &str = "text";

/// Indented plain-text listing of the source and its packages
pub struct Encoder;

impl FormatEncoder for Encoder {
    fn id(&self) -> FormatId {
        FormatId::from(FORMAT_ID)
    }

    fn version(&self) -> String {
        String::new()
    }

    fn encode(&self, writer: &mut dyn Write, sbom: &Sbom) -> Result<()> {
        writeln!(writer, "[Source: {}]", sbom.source.name)?;
        if let Some(distro) = &sbom.artifacts.linux_distribution {
            if !distro.pretty_name.is_empty() {
                writeln!(writer, "[Distro: {}]", distro.pretty_name)?;
            }
        }
        writeln!(writer)?;

        for package in sbom.packages_sorted() {
            writeln!(writer, "[{}]", package.name)?;
            writeln!(writer, "  Version:\t{}", package.version)?;
            writeln!(writer, "  Type:\t\t{}", package.package_type.name())?;
            if !package.purl.is_empty() {
                writeln!(writer, "  PURL:\t\t{}", package.purl)?;
            }
            let licenses = package.licenses.summary();
            if !licenses.is_empty() {
                writeln!(writer, "  Licenses:\t{}", licenses)?;
            }
        }
        Ok(())
    }
}
